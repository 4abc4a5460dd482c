//! Sensor reading sanity checks applied before a reading is logged.

use std::ops::RangeInclusive;

use crate::protocol::SensorPacket;

/// Why a reading was refused. Only the first failing rule is reported.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("temperature out of range: {0}")]
    TemperatureOutOfRange(i32),

    #[error("humidity out of range: {0}")]
    HumidityOutOfRange(i32),

    #[error("NaN/Inf gas reading: CH4={ch4}, CO2={co2}")]
    NonFiniteGas { ch4: f32, co2: f32 },

    #[error("negative gas reading: CH4={ch4}, CO2={co2}")]
    NegativeGas { ch4: f32, co2: f32 },

    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(i64),
}

impl ValidationError {
    /// Short name of the rule that failed, stable for log filtering.
    pub fn rule(&self) -> &'static str {
        match self {
            ValidationError::TemperatureOutOfRange(_) => "temperature out of range",
            ValidationError::HumidityOutOfRange(_) => "humidity out of range",
            ValidationError::NonFiniteGas { .. } => "NaN/Inf gas reading",
            ValidationError::NegativeGas { .. } => "negative gas reading",
            ValidationError::TimestampOutOfRange(_) => "timestamp out of range",
        }
    }
}

/// Accepted ranges for each quantity. All bounds are inclusive.
#[derive(Debug, Clone)]
pub struct SensorLimits {
    /// DHT11 operating range is narrower; this is a plausibility bound.
    pub temperature: RangeInclusive<i32>,
    pub humidity: RangeInclusive<i32>,
    /// Nov 2023 .. May 2033. Anything else means the node never got NTP time.
    pub timestamp: RangeInclusive<i64>,
}

impl Default for SensorLimits {
    fn default() -> Self {
        SensorLimits {
            temperature: -40..=80,
            humidity: 0..=100,
            timestamp: 1_700_000_000..=2_000_000_000,
        }
    }
}

impl SensorLimits {
    /// Check the rules in fixed order: temperature, humidity, gas finiteness,
    /// gas sign, timestamp.
    pub fn check(
        &self,
        temperature: i32,
        humidity: i32,
        ch4: f32,
        co2: f32,
        timestamp: i64,
    ) -> Result<(), ValidationError> {
        if !self.temperature.contains(&temperature) {
            return Err(ValidationError::TemperatureOutOfRange(temperature));
        }
        if !self.humidity.contains(&humidity) {
            return Err(ValidationError::HumidityOutOfRange(humidity));
        }
        if !ch4.is_finite() || !co2.is_finite() {
            return Err(ValidationError::NonFiniteGas { ch4, co2 });
        }
        if ch4 < 0.0 || co2 < 0.0 {
            return Err(ValidationError::NegativeGas { ch4, co2 });
        }
        if !self.timestamp.contains(&timestamp) {
            return Err(ValidationError::TimestampOutOfRange(timestamp));
        }
        Ok(())
    }

    pub fn check_packet(&self, packet: &SensorPacket) -> Result<(), ValidationError> {
        self.check(
            packet.temperature,
            packet.humidity,
            packet.ch4,
            packet.co2,
            packet.timestamp,
        )
    }
}

/// Validate a reading against the default limits.
pub fn validate_sensor_data(
    temperature: i32,
    humidity: i32,
    ch4: f32,
    co2: f32,
    timestamp: i64,
) -> Result<(), ValidationError> {
    SensorLimits::default().check(temperature, humidity, ch4, co2, timestamp)
}
