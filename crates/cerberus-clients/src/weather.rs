//! Geocoding + weather client with per-kind caches.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use cerberus_cache::Cache;
use cerberus_golden::{HttpRequest, HttpTransport};
use cerberus_ratelimit::RateLimiterRegistry;

use crate::error::{ClientError, Result};

const GEOCODING_API: &str = "https://api.openweathermap.org/geo/1.0/direct";
const WEATHER_API: &str = "https://api.openweathermap.org/data/3.0/onecall";

/// Resolved place: localized names plus coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeocodingResult {
    pub name: String,
    #[serde(default)]
    pub local_names: std::collections::HashMap<String, String>,
    pub lat: f64,
    pub lon: f64,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentWeather {
    pub dt: i64,
    pub temp: f64,
    pub feels_like: f64,
    pub pressure: i64,
    pub humidity: i64,
    pub clouds: i64,
    pub wind_speed: f64,
    pub wind_deg: i64,
    pub weather_main: String,
    pub weather_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyWeather {
    pub dt: i64,
    pub temp_day: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub pressure: i64,
    pub humidity: i64,
    pub wind_speed: f64,
    pub clouds: i64,
    pub weather_main: String,
    pub weather_description: String,
    pub pop: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherData {
    pub lat: f64,
    pub lon: f64,
    pub timezone: String,
    pub current: CurrentWeather,
    pub daily: Vec<DailyWeather>,
}

/// Geocoding record + weather record for one place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CombinedWeatherResult {
    pub location: GeocodingResult,
    pub weather: WeatherData,
}

/// Async weather client. Geocoding and weather results cache separately
/// (places barely move; weather goes stale in minutes).
pub struct WeatherClient {
    api_key: String,
    geocoding_cache: Arc<dyn Cache<String, GeocodingResult>>,
    weather_cache: Arc<dyn Cache<String, WeatherData>>,
    geocoding_ttl: i64,
    weather_ttl: i64,
    request_timeout_secs: u64,
    language: String,
    queue: String,
    limiter: Arc<RateLimiterRegistry>,
    transport: Arc<dyn HttpTransport>,
}

impl WeatherClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api_key: impl Into<String>,
        geocoding_cache: Arc<dyn Cache<String, GeocodingResult>>,
        weather_cache: Arc<dyn Cache<String, WeatherData>>,
        geocoding_ttl: i64,
        weather_ttl: i64,
        request_timeout_secs: u64,
        queue: impl Into<String>,
        limiter: Arc<RateLimiterRegistry>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            geocoding_cache,
            weather_cache,
            geocoding_ttl,
            weather_ttl,
            request_timeout_secs,
            language: "ru".to_string(),
            queue: queue.into(),
            limiter,
            transport,
        }
    }

    /// Cache key format: "city,COUNTRY,state", city/state lowercased.
    fn geocoding_key(city: &str, country: Option<&str>, state: Option<&str>) -> String {
        let mut parts = vec![city.trim().to_lowercase()];
        if let Some(country) = country {
            parts.push(country.trim().to_uppercase());
        }
        if let Some(state) = state {
            parts.push(state.trim().to_lowercase());
        }
        parts.join(",")
    }

    /// Cache key format: "lat,lon" rounded to 4 decimal places.
    fn weather_key(lat: f64, lon: f64) -> String {
        format!("{lat:.4},{lon:.4}")
    }

    /// Resolve a city name to coordinates.
    pub async fn coordinates(
        &self,
        city: &str,
        country: Option<&str>,
        state: Option<&str>,
    ) -> Result<GeocodingResult> {
        let cache_key = Self::geocoding_key(city, country, state);
        if let Some(cached) = self
            .geocoding_cache
            .get(&cache_key, Some(self.geocoding_ttl))
            .await
        {
            debug!(key = %cache_key, "geocoding cache hit");
            return Ok(cached);
        }

        let mut query_parts = vec![city.to_string()];
        if let Some(state) = state {
            query_parts.push(state.to_string());
        }
        if let Some(country) = country {
            query_parts.push(country.to_string());
        }

        self.limiter.apply_limit(&self.queue).await;
        let response = self
            .transport
            .execute(
                &HttpRequest::get(GEOCODING_API)
                    .param("q", query_parts.join(","))
                    .param("limit", "1")
                    .param("appid", self.api_key.as_str())
                    .timeout(self.request_timeout_secs),
            )
            .await?;

        if !response.is_success() {
            return Err(ClientError::Api {
                status: response.status,
                message: response.body,
            });
        }

        let results: Vec<GeocodingResult> =
            serde_json::from_str(&response.body).map_err(|e| ClientError::Parse(e.to_string()))?;
        let result = results.into_iter().next().ok_or(ClientError::NotFound)?;

        self.geocoding_cache.set(&cache_key, &result).await;
        Ok(result)
    }

    /// Current conditions plus the daily forecast for a coordinate.
    pub async fn weather(&self, lat: f64, lon: f64) -> Result<WeatherData> {
        let cache_key = Self::weather_key(lat, lon);
        if let Some(cached) = self.weather_cache.get(&cache_key, Some(self.weather_ttl)).await {
            debug!(key = %cache_key, "weather cache hit");
            return Ok(cached);
        }

        self.limiter.apply_limit(&self.queue).await;
        let response = self
            .transport
            .execute(
                &HttpRequest::get(WEATHER_API)
                    .param("lat", format!("{lat:.4}"))
                    .param("lon", format!("{lon:.4}"))
                    .param("units", "metric")
                    .param("lang", self.language.as_str())
                    .param("exclude", "minutely,hourly,alerts")
                    .param("appid", self.api_key.as_str())
                    .timeout(self.request_timeout_secs),
            )
            .await?;

        if !response.is_success() {
            return Err(ClientError::Api {
                status: response.status,
                message: response.body,
            });
        }

        let raw: Value =
            serde_json::from_str(&response.body).map_err(|e| ClientError::Parse(e.to_string()))?;
        let data = parse_weather(&raw)?;

        self.weather_cache.set(&cache_key, &data).await;
        Ok(data)
    }

    /// Geocode then fetch weather in one call.
    pub async fn weather_by_city(
        &self,
        city: &str,
        country: Option<&str>,
    ) -> Result<CombinedWeatherResult> {
        let location = self.coordinates(city, country, None).await?;
        let weather = self.weather(location.lat, location.lon).await?;
        Ok(CombinedWeatherResult { location, weather })
    }
}

/// Flatten the one-call response: weather condition arrays collapse into
/// (main, description) pairs.
fn parse_weather(raw: &Value) -> Result<WeatherData> {
    let current = &raw["current"];
    let condition = &current["weather"][0];

    let daily = raw["daily"]
        .as_array()
        .map(|days| {
            days.iter()
                .map(|day| DailyWeather {
                    dt: day["dt"].as_i64().unwrap_or(0),
                    temp_day: day["temp"]["day"].as_f64().unwrap_or(0.0),
                    temp_min: day["temp"]["min"].as_f64().unwrap_or(0.0),
                    temp_max: day["temp"]["max"].as_f64().unwrap_or(0.0),
                    pressure: day["pressure"].as_i64().unwrap_or(0),
                    humidity: day["humidity"].as_i64().unwrap_or(0),
                    wind_speed: day["wind_speed"].as_f64().unwrap_or(0.0),
                    clouds: day["clouds"].as_i64().unwrap_or(0),
                    weather_main: day["weather"][0]["main"].as_str().unwrap_or("").to_string(),
                    weather_description: day["weather"][0]["description"]
                        .as_str()
                        .unwrap_or("")
                        .to_string(),
                    pop: day["pop"].as_f64().unwrap_or(0.0),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(WeatherData {
        lat: raw["lat"].as_f64().unwrap_or(0.0),
        lon: raw["lon"].as_f64().unwrap_or(0.0),
        timezone: raw["timezone"].as_str().unwrap_or("").to_string(),
        current: CurrentWeather {
            dt: current["dt"].as_i64().unwrap_or(0),
            temp: current["temp"].as_f64().unwrap_or(0.0),
            feels_like: current["feels_like"].as_f64().unwrap_or(0.0),
            pressure: current["pressure"].as_i64().unwrap_or(0),
            humidity: current["humidity"].as_i64().unwrap_or(0),
            clouds: current["clouds"].as_i64().unwrap_or(0),
            wind_speed: current["wind_speed"].as_f64().unwrap_or(0.0),
            wind_deg: current["wind_deg"].as_i64().unwrap_or(0),
            weather_main: condition["main"].as_str().unwrap_or("").to_string(),
            weather_description: condition["description"].as_str().unwrap_or("").to_string(),
        },
        daily,
    })
}
