use std::{fs, io::Read, path::Path};

use serde_json::Value;

use crate::error::BuildError;

/// Read the monolithic report collection.
///
/// The file must be a JSON array; anything else aborts the build. Individual
/// entries are left unparsed so one odd record cannot fail the whole run.
pub fn read_source(path: impl AsRef<Path>) -> Result<Vec<Value>, BuildError> {
    let path = path.as_ref();
    let file = fs::File::open(path).map_err(|source| BuildError::ReadInput {
        path: path.to_path_buf(),
        source,
    })?;
    parse_source(std::io::BufReader::new(file))
}

pub fn parse_source(reader: impl Read) -> Result<Vec<Value>, BuildError> {
    let value: Value =
        serde_json::from_reader(reader).map_err(|err| BuildError::MalformedInput(err.to_string()))?;
    match value {
        Value::Array(records) => Ok(records),
        other => Err(BuildError::MalformedInput(format!(
            "expected a JSON array of reports, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
