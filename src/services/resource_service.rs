use std::sync::Mutex;

use chrono::Utc;
use sysinfo::System;

use crate::models::resource_snapshot::SystemResourceSnapshot;

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

enum Source {
    Host(Mutex<System>),
    #[cfg(test)]
    Fixed(SystemResourceSnapshot),
}

/// Samples host memory, swap and CPU.
pub struct ResourceMonitor {
    source: Source,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu();
        Self {
            source: Source::Host(Mutex::new(system)),
        }
    }

    /// Always report the given snapshot.
    #[cfg(test)]
    pub fn fixed(snapshot: SystemResourceSnapshot) -> Self {
        Self {
            source: Source::Fixed(snapshot),
        }
    }

    #[cfg(test)]
    pub fn with_pressure(pressure: f64) -> Self {
        Self::fixed(SystemResourceSnapshot {
            memory_available_gb: 16.0 * (1.0 - pressure),
            memory_free_gb: 16.0 * (1.0 - pressure),
            memory_total_gb: 16.0,
            cpu_usage_percent: 10.0,
            swap_used_percent: 0.0,
            recorded_at: Utc::now(),
        })
    }

    pub fn sample(&self) -> SystemResourceSnapshot {
        match &self.source {
            Source::Host(system) => {
                let mut system = system.lock().unwrap_or_else(|e| e.into_inner());
                system.refresh_memory();
                system.refresh_cpu();
                snapshot_from(&system)
            }
            #[cfg(test)]
            Source::Fixed(snapshot) => SystemResourceSnapshot {
                recorded_at: Utc::now(),
                ..snapshot.clone()
            },
        }
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot_from(system: &System) -> SystemResourceSnapshot {
    let swap_total = system.total_swap();
    let swap_used_percent = if swap_total > 0 {
        system.used_swap() as f64 / swap_total as f64 * 100.0
    } else {
        0.0
    };

    SystemResourceSnapshot {
        memory_available_gb: system.available_memory() as f64 / BYTES_PER_GB,
        memory_free_gb: system.free_memory() as f64 / BYTES_PER_GB,
        memory_total_gb: system.total_memory() as f64 / BYTES_PER_GB,
        cpu_usage_percent: f64::from(system.global_cpu_info().cpu_usage()),
        swap_used_percent,
        recorded_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_sample_is_sane() {
        let snapshot = ResourceMonitor::new().sample();
        assert!(snapshot.memory_total_gb > 0.0);
        assert!(snapshot.memory_available_gb <= snapshot.memory_total_gb);
        let pressure = snapshot.memory_pressure();
        assert!((0.0..=1.0).contains(&pressure));
    }

    #[test]
    fn fixed_pressure() {
        let monitor = ResourceMonitor::with_pressure(0.9);
        assert!((monitor.sample().memory_pressure() - 0.9).abs() < 1e-9);
    }
}
