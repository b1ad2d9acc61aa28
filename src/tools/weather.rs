use super::traits::{required_str, Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

/// Mock weather report for a city.
pub struct WeatherTool;

pub fn weather_report(city: &str) -> String {
    match city.to_lowercase().as_str() {
        "new york" => "The weather in New York is sunny with a temperature of 25 degrees \
                       Celsius (77 degrees Fahrenheit)."
            .to_string(),
        "london" => "The weather in London is rainy with a temperature of 15 degrees \
                     Celsius (59 degrees Fahrenheit)."
            .to_string(),
        _ => format!(
            "The weather in {city} is partly cloudy with a temperature of 20 degrees Celsius."
        ),
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Retrieves the current weather report for a specified city."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "The name of the city for which to retrieve the weather report."
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let Some(city) = required_str(&args, "city") else {
            return Ok(ToolResult::error("Missing 'city' parameter"));
        };
        Ok(ToolResult::success(weather_report(city)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_cities_are_case_insensitive() {
        assert!(weather_report("NEW YORK").contains("sunny"));
        assert!(weather_report("New York").contains("77 degrees Fahrenheit"));
        assert!(weather_report("london").contains("rainy"));
    }

    #[test]
    fn unknown_city_keeps_original_spelling() {
        assert_eq!(
            weather_report("Paris"),
            "The weather in Paris is partly cloudy with a temperature of 20 degrees Celsius."
        );
    }

    #[tokio::test]
    async fn missing_city_is_error_envelope() {
        let result = WeatherTool.execute(json!({})).await.unwrap();
        assert!(!result.is_success());
    }
}
