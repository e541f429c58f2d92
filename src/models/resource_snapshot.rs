use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Periodic host sample, appended to `system_resources`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SystemResourceSnapshot {
    pub memory_available_gb: f64,
    pub memory_free_gb: f64,
    pub memory_total_gb: f64,
    pub cpu_usage_percent: f64,
    pub swap_used_percent: f64,
    pub recorded_at: DateTime<Utc>,
}

impl SystemResourceSnapshot {
    /// Fraction of memory in use, in `[0, 1]`.
    pub fn memory_pressure(&self) -> f64 {
        if self.memory_total_gb <= 0.0 {
            return 0.0;
        }
        (1.0 - self.memory_available_gb / self.memory_total_gb).clamp(0.0, 1.0)
    }
}

/// Projection embedded in selection responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemMetrics {
    pub memory_pressure: f64,
    pub memory_available_gb: f64,
    pub memory_total_gb: f64,
    pub cpu_usage_percent: f64,
    pub swap_used_percent: f64,
}

impl From<&SystemResourceSnapshot> for SystemMetrics {
    fn from(s: &SystemResourceSnapshot) -> Self {
        Self {
            memory_pressure: s.memory_pressure(),
            memory_available_gb: s.memory_available_gb,
            memory_total_gb: s.memory_total_gb,
            cpu_usage_percent: s.cpu_usage_percent,
            swap_used_percent: s.swap_used_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(available: f64, total: f64) -> SystemResourceSnapshot {
        SystemResourceSnapshot {
            memory_available_gb: available,
            memory_free_gb: available,
            memory_total_gb: total,
            cpu_usage_percent: 0.0,
            swap_used_percent: 0.0,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn pressure_is_used_fraction() {
        assert!((snapshot(4.0, 16.0).memory_pressure() - 0.75).abs() < 1e-9);
        assert_eq!(snapshot(0.0, 0.0).memory_pressure(), 0.0);
    }
}
