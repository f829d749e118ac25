// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure rollup arithmetic (§4.6 "Algorithm" step c). Kept free of any
//! store/IO dependency so the averaging rules are unit-testable without a
//! `Store` — the surrounding [`super`] module is the only caller.

use std::collections::BTreeSet;

use crate::model::{ContainerStats, FsStats, GpuStats, SystemStats};

/// Round to two decimal places on emission (§4.6 step 3).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let count = values.clone().count();
    if count == 0 {
        return 0.0;
    }
    values.sum::<f64>() / count as f64
}

fn max_of(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(f64::MIN, f64::max)
}

/// Combine `rows` (chronologically ordered) into a single rolled-up row.
/// Scalars average; `MaxX` companions take the maximum across inputs,
/// never the average (§3 invariant `MaxX >= X`, §4.6 step c).
pub fn combine_system_stats(rows: &[SystemStats]) -> SystemStats {
    if rows.is_empty() {
        return SystemStats::default();
    }
    let n = rows.len() as f64;

    let battery_values: Vec<f64> = rows.iter().filter_map(|r| r.battery_pct).collect();
    let battery_pct = if battery_values.is_empty() {
        None
    } else {
        Some(round2(battery_values.iter().sum::<f64>() / battery_values.len() as f64))
    };

    let net_sent_bytes = (rows.iter().map(|r| r.net_sent_bytes as f64).sum::<f64>() / n).round() as u64;
    let net_recv_bytes = (rows.iter().map(|r| r.net_recv_bytes as f64).sum::<f64>() / n).round() as u64;

    SystemStats {
        cpu: round2(mean(rows.iter().map(|r| r.cpu))),
        max_cpu: round2(max_of(rows.iter().map(|r| r.max_cpu))),
        mem_pct: round2(mean(rows.iter().map(|r| r.mem_pct))),
        max_mem_pct: round2(max_of(rows.iter().map(|r| r.max_mem_pct))),
        disk_pct: round2(mean(rows.iter().map(|r| r.disk_pct))),
        max_disk_pct: round2(max_of(rows.iter().map(|r| r.max_disk_pct))),
        load_avg1: round2(mean(rows.iter().map(|r| r.load_avg1))),
        load_avg5: round2(mean(rows.iter().map(|r| r.load_avg5))),
        load_avg15: round2(mean(rows.iter().map(|r| r.load_avg15))),
        swap_pct: round2(mean(rows.iter().map(|r| r.swap_pct))),
        max_swap_pct: round2(max_of(rows.iter().map(|r| r.max_swap_pct))),
        battery_pct,
        net_sent_bytes,
        net_recv_bytes,
        nics: combine_nics(rows),
        temperatures: combine_temperatures(rows),
        filesystems: combine_filesystems(rows),
        gpus: combine_gpus(rows),
        per_core_cpu: combine_per_core_cpu(rows),
    }
}

/// `[tx_sum, rx_sum, tx_max, rx_max]` per NIC: average the sums, max the maxes
/// (§4.6 step c), over only the rows that actually reported that NIC.
fn combine_nics(rows: &[SystemStats]) -> std::collections::HashMap<String, [f64; 4]> {
    let mut keys = BTreeSet::new();
    for r in rows {
        keys.extend(r.nics.keys().cloned());
    }
    let mut out = std::collections::HashMap::new();
    for key in keys {
        let present: Vec<&[f64; 4]> = rows.iter().filter_map(|r| r.nics.get(&key)).collect();
        if present.is_empty() {
            continue;
        }
        let len = present.len() as f64;
        let tx_sum = present.iter().map(|v| v[0]).sum::<f64>() / len;
        let rx_sum = present.iter().map(|v| v[1]).sum::<f64>() / len;
        let tx_max = present.iter().map(|v| v[2]).fold(f64::MIN, f64::max);
        let rx_max = present.iter().map(|v| v[3]).fold(f64::MIN, f64::max);
        out.insert(key, [round2(tx_sum), round2(rx_sum), round2(tx_max), round2(rx_max)]);
    }
    out
}

/// Average only over rows that had the sensor present ("tempCount", §4.6 step c).
fn combine_temperatures(rows: &[SystemStats]) -> std::collections::HashMap<String, f64> {
    let mut keys = BTreeSet::new();
    for r in rows {
        keys.extend(r.temperatures.keys().cloned());
    }
    let mut out = std::collections::HashMap::new();
    for key in keys {
        let present: Vec<f64> = rows.iter().filter_map(|r| r.temperatures.get(&key).copied()).collect();
        if present.is_empty() {
            continue;
        }
        out.insert(key, round2(present.iter().sum::<f64>() / present.len() as f64));
    }
    out
}

fn combine_filesystems(rows: &[SystemStats]) -> std::collections::HashMap<String, FsStats> {
    let mut keys = BTreeSet::new();
    for r in rows {
        keys.extend(r.filesystems.keys().cloned());
    }
    let mut out = std::collections::HashMap::new();
    for key in keys {
        let present: Vec<&FsStats> = rows.iter().filter_map(|r| r.filesystems.get(&key)).collect();
        if present.is_empty() {
            continue;
        }
        let len = present.len() as f64;
        let used_pct = present.iter().map(|f| f.used_pct).sum::<f64>() / len;
        let max_used_pct = present.iter().map(|f| f.max_used_pct).fold(f64::MIN, f64::max);
        out.insert(key, FsStats { used_pct: round2(used_pct), max_used_pct: round2(max_used_pct) });
    }
    out
}

/// GPU scalar fields average over rows reporting that GPU; `engines` map
/// averages per engine key, over only rows reporting that engine (§4.6 step c).
fn combine_gpus(rows: &[SystemStats]) -> std::collections::HashMap<String, GpuStats> {
    let mut keys = BTreeSet::new();
    for r in rows {
        keys.extend(r.gpus.keys().cloned());
    }
    let mut out = std::collections::HashMap::new();
    for key in keys {
        let present: Vec<&GpuStats> = rows.iter().filter_map(|r| r.gpus.get(&key)).collect();
        if present.is_empty() {
            continue;
        }
        let len = present.len() as f64;
        let temperature = round2(present.iter().map(|g| g.temperature).sum::<f64>() / len);
        let mem_used = round2(present.iter().map(|g| g.mem_used).sum::<f64>() / len);
        let mem_total = round2(present.iter().map(|g| g.mem_total).sum::<f64>() / len);
        let usage = round2(present.iter().map(|g| g.usage).sum::<f64>() / len);
        let power = round2(present.iter().map(|g| g.power).sum::<f64>() / len);

        let mut engine_keys = BTreeSet::new();
        for gpu in &present {
            engine_keys.extend(gpu.engines.keys().cloned());
        }
        let mut engines = std::collections::HashMap::new();
        for ek in engine_keys {
            let values: Vec<f64> = present.iter().filter_map(|g| g.engines.get(&ek).copied()).collect();
            if values.is_empty() {
                continue;
            }
            engines.insert(ek, round2(values.iter().sum::<f64>() / values.len() as f64));
        }

        out.insert(key, GpuStats { temperature, mem_used, mem_total, usage, power, engines });
    }
    out
}

/// Per-core usage is byte-sized (§3); average by integer rounding (§4.6 step c).
fn combine_per_core_cpu(rows: &[SystemStats]) -> Vec<u8> {
    let width = rows.iter().map(|r| r.per_core_cpu.len()).max().unwrap_or(0);
    let mut out = Vec::with_capacity(width);
    for i in 0..width {
        let values: Vec<u32> = rows.iter().filter_map(|r| r.per_core_cpu.get(i)).map(|&v| v as u32).collect();
        if values.is_empty() {
            out.push(0);
            continue;
        }
        let avg = (values.iter().sum::<u32>() as f64 / values.len() as f64).round() as u8;
        out.push(avg);
    }
    out
}

/// Container-stats rollup: average per-container scalars over rows the
/// container appears in; a container absent from a row simply doesn't
/// contribute to that row's average (it does not count as zero).
pub fn combine_container_stats(rows: &[Vec<ContainerStats>]) -> Vec<ContainerStats> {
    let mut names = BTreeSet::new();
    for list in rows {
        for c in list {
            names.insert(c.name.clone());
        }
    }

    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let present: Vec<&ContainerStats> =
            rows.iter().filter_map(|list| list.iter().find(|c| c.name == name)).collect();
        if present.is_empty() {
            continue;
        }
        let len = present.len() as f64;
        let cpu_pct = round2(present.iter().map(|c| c.cpu_pct).sum::<f64>() / len);
        let mem_pct = round2(present.iter().map(|c| c.mem_pct).sum::<f64>() / len);
        let net_sent_bytes = (present.iter().map(|c| c.net_sent_bytes as f64).sum::<f64>() / len).round() as u64;
        let net_recv_bytes = (present.iter().map(|c| c.net_recv_bytes as f64).sum::<f64>() / len).round() as u64;
        // health/uptime aren't averageable; take the most recent reading.
        let latest = present.last().copied();
        out.push(ContainerStats {
            name,
            cpu_pct,
            mem_pct,
            net_sent_bytes,
            net_recv_bytes,
            health: latest.and_then(|c| c.health.clone()),
            uptime_secs: latest.and_then(|c| c.uptime_secs),
        });
    }
    out
}
