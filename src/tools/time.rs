use super::traits::{required_str, Tool, ToolResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::json;

/// Current wall-clock time for a handful of well-known cities.
pub struct CurrentTimeTool;

/// IANA zone for a city; unknown cities fall back to UTC.
pub fn timezone_for(city: &str) -> Tz {
    match city.to_lowercase().as_str() {
        "new york" => chrono_tz::America::New_York,
        "london" => chrono_tz::Europe::London,
        "tokyo" => chrono_tz::Asia::Tokyo,
        "sydney" => chrono_tz::Australia::Sydney,
        "los angeles" => chrono_tz::America::Los_Angeles,
        _ => chrono_tz::UTC,
    }
}

pub fn time_report(city: &str, now: DateTime<Utc>) -> String {
    let local = now.with_timezone(&timezone_for(city));
    format!(
        "The current time in {city} is {}",
        local.format("%Y-%m-%d %H:%M:%S %Z%z")
    )
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Returns the current time in a specified city."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "The name of the city for which to retrieve the current time."
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let Some(city) = required_str(&args, "city") else {
            return Ok(ToolResult::error("Missing 'city' parameter"));
        };
        Ok(ToolResult::success(time_report(city, Utc::now())))
    }
}
