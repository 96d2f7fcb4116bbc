//! Host health metrics gathered with one shell command.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Percentage above which memory or disk usage marks a host unhealthy.
pub const UNHEALTHY_USAGE_PERCENT: f64 = 95.0;

const SECTION: &str = "---";

/// Prints CPU, memory, disk and load sections separated by `---`.
pub const HEALTH_COMMAND: &str =
    "top -bn1 | grep -i '^%\\?cpu' | head -n1; echo ---; free -m; echo ---; df -BG /; echo ---; cat /proc/loadavg";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostMetrics {
    pub cpu_percent: f64,
    pub memory_used_mb: i64,
    pub memory_total_mb: i64,
    pub disk_used_gb: i64,
    pub disk_total_gb: i64,
    pub load_1: f64,
    pub load_5: f64,
    pub load_15: f64,
}

impl HostMetrics {
    pub fn memory_percent(&self) -> f64 {
        percent(self.memory_used_mb, self.memory_total_mb)
    }

    pub fn disk_percent(&self) -> f64 {
        percent(self.disk_used_gb, self.disk_total_gb)
    }

    pub fn is_healthy(&self) -> bool {
        self.memory_percent() < UNHEALTHY_USAGE_PERCENT && self.disk_percent() < UNHEALTHY_USAGE_PERCENT
    }
}

fn percent(used: i64, total: i64) -> f64 {
    if total <= 0 {
        0.0
    } else {
        used as f64 * 100.0 / total as f64
    }
}

fn parse_err(what: &str) -> CoreError {
    CoreError::Internal(format!("Unexpected {what} output from host"))
}

/// `%Cpu(s):  3.1 us,  1.0 sy,  0.0 ni, 95.4 id, ...` -> 4.6
pub fn parse_cpu(line: &str) -> Result<f64, CoreError> {
    let (_, fields) = line.split_once(':').ok_or_else(|| parse_err("top"))?;
    fields
        .split(',')
        .map(str::trim)
        .find_map(|f| f.strip_suffix("id").map(str::trim))
        .and_then(|idle| idle.parse::<f64>().ok())
        .map(|idle| ((100.0 - idle) * 10.0).round() / 10.0)
        .ok_or_else(|| parse_err("top"))
}

/// `free -m` -> (used, total) in MiB.
pub fn parse_free(output: &str) -> Result<(i64, i64), CoreError> {
    let line = output
        .lines()
        .find(|l| l.trim_start().starts_with("Mem:"))
        .ok_or_else(|| parse_err("free"))?;
    let nums: Vec<i64> = line.split_whitespace().skip(1).filter_map(|v| v.parse().ok()).collect();
    match nums.as_slice() {
        [total, used, ..] => Ok((*used, *total)),
        _ => Err(parse_err("free")),
    }
}

/// `df -BG /` -> (used, total) in GiB.
pub fn parse_df(output: &str) -> Result<(i64, i64), CoreError> {
    let line = output
        .lines()
        .skip(1)
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| parse_err("df"))?;
    let cols: Vec<&str> = line.split_whitespace().collect();
    let gib = |s: &str| s.trim_end_matches('G').parse::<i64>().ok();
    match cols.as_slice() {
        [_, total, used, ..] => match (gib(used), gib(total)) {
            (Some(used), Some(total)) => Ok((used, total)),
            _ => Err(parse_err("df")),
        },
        _ => Err(parse_err("df")),
    }
}

/// `/proc/loadavg` -> (1, 5, 15 minute load).
pub fn parse_loadavg(output: &str) -> Result<(f64, f64, f64), CoreError> {
    let nums: Vec<f64> = output.split_whitespace().take(3).filter_map(|v| v.parse().ok()).collect();
    match nums.as_slice() {
        [a, b, c] => Ok((*a, *b, *c)),
        _ => Err(parse_err("loadavg")),
    }
}

/// Parse the output of [`HEALTH_COMMAND`].
pub fn parse_health(output: &str) -> Result<HostMetrics, CoreError> {
    let sections: Vec<&str> = output.split(SECTION).collect();
    let [cpu, free, df, load] = sections.as_slice() else {
        return Err(parse_err("health"));
    };
    let (memory_used_mb, memory_total_mb) = parse_free(free)?;
    let (disk_used_gb, disk_total_gb) = parse_df(df)?;
    let (load_1, load_5, load_15) = parse_loadavg(load)?;
    Ok(HostMetrics {
        cpu_percent: parse_cpu(cpu.trim())?,
        memory_used_mb,
        memory_total_mb,
        disk_used_gb,
        disk_total_gb,
        load_1,
        load_5,
        load_15,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "%Cpu(s):  3.1 us,  1.0 sy,  0.0 ni, 95.4 id,  0.3 wa,  0.0 hi,  0.2 si,  0.0 st
---
               total        used        free      shared  buff/cache   available
Mem:            7951        2113        3021         190        2816        5364
Swap:           2047           0        2047
---
Filesystem     1G-blocks  Used Available Use% Mounted on
/dev/sda1           79G   31G       45G  41% /
---
0.42 0.35 0.30 1/345 12345
";

    #[test]
    fn parses_full_sample() {
        let m = parse_health(SAMPLE).unwrap();
        assert_eq!(m.cpu_percent, 4.6);
        assert_eq!((m.memory_used_mb, m.memory_total_mb), (2113, 7951));
        assert_eq!((m.disk_used_gb, m.disk_total_gb), (31, 79));
        assert_eq!((m.load_1, m.load_5, m.load_15), (0.42, 0.35, 0.30));
        assert!(m.is_healthy());
    }

    #[test]
    fn full_disk_is_unhealthy() {
        let m = HostMetrics {
            disk_used_gb: 78,
            disk_total_gb: 79,
            memory_total_mb: 100,
            ..Default::default()
        };
        assert!(!m.is_healthy());
    }

    #[test]
    fn malformed_output_is_an_error() {
        assert!(parse_health("nope").is_err());
        assert!(parse_free("Swap: 1 2").is_err());
        assert!(parse_loadavg("x y").is_err());
    }
}
