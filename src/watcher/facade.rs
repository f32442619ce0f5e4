use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tracing::debug;
use tracing::info;

use super::WatcherRegistry;
use crate::cache::Controller;
use crate::cache::EntityKind;
use crate::WatcherError;

const MACHINE_TAG_PREFIX: &str = "machine-";

/// Caller identity checks, supplied by whatever authenticates the
/// connection.
#[cfg_attr(test, automock)]
pub trait Authorizer: Send + Sync {
    /// Whether the caller is a machine agent.
    fn auth_machine_agent(&self) -> bool;

    /// Whether the caller owns the entity behind `tag`.
    fn auth_owner(
        &self,
        tag: &str,
    ) -> bool;
}

/// Outcome of one requested watch: a registry handle or an error, never
/// both.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotifyWatchResult {
    pub watcher_id: Option<String>,
    pub error: Option<WatcherError>,
}

impl NotifyWatchResult {
    fn registered(watcher_id: String) -> Self {
        Self {
            watcher_id: Some(watcher_id),
            error: None,
        }
    }

    fn failed(error: WatcherError) -> Self {
        Self {
            watcher_id: None,
            error: Some(error),
        }
    }
}

/// Remote-facing surface that turns entity watches into registered,
/// pollable handles.
///
/// Watches are armed before registration, so a handle's first poll only
/// reports changes made after the watch was set up.
pub struct EntityWatchFacade {
    controller: Arc<Controller>,
    registry: Arc<WatcherRegistry>,
    authorizer: Arc<dyn Authorizer>,
    model_uuid: String,
}

impl std::fmt::Debug for EntityWatchFacade {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EntityWatchFacade")
            .field("model_uuid", &self.model_uuid)
            .finish_non_exhaustive()
    }
}

impl EntityWatchFacade {
    /// # Errors
    /// `WatcherError::PermissionDenied` unless the caller is a machine agent.
    pub fn new(
        controller: Arc<Controller>,
        registry: Arc<WatcherRegistry>,
        authorizer: Arc<dyn Authorizer>,
        model_uuid: impl Into<String>,
    ) -> Result<Self, WatcherError> {
        if !authorizer.auth_machine_agent() {
            return Err(WatcherError::PermissionDenied);
        }
        Ok(Self {
            controller,
            registry,
            authorizer,
            model_uuid: model_uuid.into(),
        })
    }

    /// Watch each machine named by `tags`, in order.
    ///
    /// Per-entry failures (not owned, not cached, closed before arming,
    /// registry full) are reported in that entry's result. In particular a
    /// machine missing from the cache yields `NotFound` for its own entry
    /// only: the call does not abort, and the remaining tags still register.
    ///
    /// # Errors
    /// `WatcherError::InvalidTag` if any tag is not a machine tag; nothing
    /// is registered in that case.
    pub fn watch_machines(
        &self,
        tags: &[&str],
    ) -> Result<Vec<NotifyWatchResult>, WatcherError> {
        let ids = tags
            .iter()
            .map(|tag| parse_machine_tag(tag))
            .collect::<Result<Vec<String>, WatcherError>>()?;

        let results = tags
            .iter()
            .zip(ids)
            .map(|(tag, id)| {
                info!(tag, model_uuid = %self.model_uuid, "Watching machine");
                match self.watch_machine(tag, &id) {
                    Ok(watcher_id) => NotifyWatchResult::registered(watcher_id),
                    Err(e) => {
                        debug!(tag, error = %e, "Machine watch refused");
                        NotifyWatchResult::failed(e)
                    }
                }
            })
            .collect();
        Ok(results)
    }

    fn watch_machine(
        &self,
        tag: &str,
        id: &str,
    ) -> Result<String, WatcherError> {
        if !self.authorizer.auth_owner(tag) {
            return Err(WatcherError::PermissionDenied);
        }

        let notifier = self
            .controller
            .model_cache(&self.model_uuid)
            .and_then(|model| model.watch_machine(id))
            .ok_or_else(|| WatcherError::NotFound {
                kind: EntityKind::Machine,
                key: id.to_string(),
            })?;

        let armed = notifier.arm()?;
        self.registry.register(Box::new(armed))
    }
}

/// Machine id behind a `machine-` tag: `machine-0` is `0`, and
/// `machine-0-lxd-1` is the container `0/lxd/1`.
pub fn parse_machine_tag(tag: &str) -> Result<String, WatcherError> {
    let invalid = || WatcherError::InvalidTag(tag.to_string());

    let rest = tag.strip_prefix(MACHINE_TAG_PREFIX).ok_or_else(invalid)?;
    let parts: Vec<&str> = rest.split('-').collect();

    // Host number, then (container type, number) pairs.
    if parts.len() % 2 == 0 {
        return Err(invalid());
    }
    for (i, part) in parts.iter().enumerate() {
        let valid = if i % 2 == 0 {
            is_machine_number(part)
        } else {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase())
        };
        if !valid {
            return Err(invalid());
        }
    }
    Ok(parts.join("/"))
}

fn is_machine_number(part: &str) -> bool {
    !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()) && (part == "0" || !part.starts_with('0'))
}
