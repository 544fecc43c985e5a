use serde_json::{json, Map, Value};

use crate::cli::client::ApiResponse;
use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = Map::new();
            response.insert("success".into(), json!(true));
            response.insert("message".into(), json!(message));

            if let Some(Value::Object(extra)) = data {
                response.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Print an API response: the raw envelope for JSON, data or errors for text.
/// A failed call becomes an error so the process exits non-zero.
pub fn output_api_response(output_format: &OutputFormat, response: &ApiResponse) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&response.body)?);
        }
        OutputFormat::Text if response.ok() => match response.data() {
            Value::Null => println!("✓ ok"),
            data => println!("{}", serde_json::to_string_pretty(data)?),
        },
        OutputFormat::Text => {}
    }

    if response.ok() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{} ({})", response.error_message(), response.status))
    }
}

/// `key=value` pairs from the command line
pub fn parse_pairs(pairs: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("expected key=value, got '{}'", pair))
        })
        .collect()
}

/// A request body given as a JSON object string
pub fn parse_body(data: Option<&str>) -> anyhow::Result<Option<Map<String, Value>>> {
    match data {
        None => Ok(None),
        Some(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Err(anyhow::anyhow!("request body must be a JSON object")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_split_on_first_equals() {
        let pairs = parse_pairs(&["page=2".into(), "filter=a=b".into()]).unwrap();
        assert_eq!(pairs, vec![("page".into(), "2".into()), ("filter".into(), "a=b".into())]);
        assert!(parse_pairs(&["nope".into()]).is_err());
    }

    #[test]
    fn bodies_must_be_objects() {
        assert!(parse_body(None).unwrap().is_none());
        assert_eq!(parse_body(Some(r#"{"name":"North"}"#)).unwrap().unwrap()["name"], "North");
        assert!(parse_body(Some("[1]")).is_err());
        assert!(parse_body(Some("{oops")).is_err());
    }
}
