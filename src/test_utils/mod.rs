//! the test_utils folder here will share builders and fixtures between the
//! unit tests of every module
mod change_builder;
mod common;

pub(crate) use change_builder::*;
pub(crate) use common::*;
