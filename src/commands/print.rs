use pulse::cache::QueryState;
use serde::Serialize;
use serde_json::Value;

use super::CliError;

pub fn print_json(value: &Value) -> Result<(), CliError> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

pub fn to_value<T: Serialize>(value: T) -> Result<Value, CliError> {
    Ok(serde_json::to_value(value)?)
}

/// Ready values serialize as themselves, disabled reads as `null`.
pub fn state_value<T: Serialize>(state: QueryState<T>) -> Result<Value, CliError> {
    match state {
        QueryState::Ready(value) => to_value(value),
        QueryState::Disabled => Ok(Value::Null),
    }
}
