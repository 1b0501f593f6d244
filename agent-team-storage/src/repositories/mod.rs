//! Repository implementations for all persisted records

pub mod agent;
pub mod assignment;
pub mod service;
pub mod task;

pub use agent::AgentRepository;
pub use assignment::AssignmentRepository;
pub use service::ServiceRepository;
pub use task::TaskRepository;

use std::str::FromStr;

use crate::{Error, Result};

/// Parse an enum column stored in its display form
pub(crate) fn parse_column<T>(entity: &'static str, id: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| Error::invalid_record(entity, id, e.to_string()))
}

/// Narrow an INTEGER column to the width of the domain field
pub(crate) fn narrow<T>(entity: &'static str, id: &str, column: &str, value: i64) -> Result<T>
where
    T: TryFrom<i64>,
{
    T::try_from(value).map_err(|_| {
        Error::invalid_record(entity, id, format!("{} out of range: {}", column, value))
    })
}
