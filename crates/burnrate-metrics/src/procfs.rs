//! Jiffy counters from procfs.
//!
//! Reads are fail-soft: an unreadable or malformed file contributes a zero
//! counter instead of an error.

use std::path::PathBuf;

use tracing::debug;

use burnrate_core::CpuSample;
use burnrate_core::config::LocalConfig;

/// Something that can produce a `CpuSample` right now.
pub trait CpuCounters: Send + Sync {
    fn read(&self) -> CpuSample;
}

/// Counters backed by `/proc/stat` and `/proc/self/stat`.
#[derive(Debug, Clone)]
pub struct ProcfsCounters {
    proc_stat: PathBuf,
    self_stat: PathBuf,
}

impl ProcfsCounters {
    pub fn new(proc_stat: impl Into<PathBuf>, self_stat: impl Into<PathBuf>) -> Self {
        Self {
            proc_stat: proc_stat.into(),
            self_stat: self_stat.into(),
        }
    }

    pub fn from_config(config: &LocalConfig) -> Self {
        Self::new(&config.proc_stat, &config.self_stat)
    }
}

impl Default for ProcfsCounters {
    fn default() -> Self {
        Self::from_config(&LocalConfig::default())
    }
}

impl CpuCounters for ProcfsCounters {
    fn read(&self) -> CpuSample {
        let total_jiffies = match std::fs::read_to_string(&self.proc_stat) {
            Ok(content) => parse_total_jiffies(&content).unwrap_or_else(|| {
                debug!(path = %self.proc_stat.display(), "malformed cpu line");
                0
            }),
            Err(e) => {
                debug!(
                    path = %self.proc_stat.display(),
                    error = %e,
                    "cannot read system cpu counters"
                );
                0
            }
        };

        let proc_jiffies = match std::fs::read_to_string(&self.self_stat) {
            Ok(content) => parse_process_jiffies(&content).unwrap_or_else(|| {
                debug!(path = %self.self_stat.display(), "malformed process stat");
                0
            }),
            Err(e) => {
                debug!(
                    path = %self.self_stat.display(),
                    error = %e,
                    "cannot read process cpu counters"
                );
                0
            }
        };

        CpuSample::new(total_jiffies, proc_jiffies)
    }
}

/// Sum user, nice, system, idle, iowait, irq, softirq and steal from the
/// aggregate `cpu` line. Older kernels omit the trailing columns; those
/// count as zero.
pub fn parse_total_jiffies(proc_stat: &str) -> Option<u64> {
    let line = proc_stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|f| f.parse::<u64>().ok())
        .collect::<Option<_>>()?;

    // user nice system idle is the minimum any kernel reports.
    if fields.len() < 4 {
        return None;
    }
    Some(fields.iter().fold(0u64, |acc, v| acc.saturating_add(*v)))
}

/// `utime + stime` (fields 14 and 15) from `/proc/[pid]/stat`.
///
/// Field 2 is the command name in parentheses and may itself contain
/// spaces or parentheses, so fields are counted from the last `)`.
pub fn parse_process_jiffies(self_stat: &str) -> Option<u64> {
    let rest = &self_stat[self_stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    // After the command name: state is field 3, utime is field 14.
    let utime: u64 = fields.nth(11)?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some(utime.saturating_add(stime))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_STAT: &str = "\
cpu  10132153 290696 3084719 46828483 16683 0 25195 0 175628 0
cpu0 1393280 32966 572056 13343292 6130 0 17875 0 23933 0
intr 114930548 113199788 3 0 5 263 0 4 [... lots more numbers ...]
ctxt 1990473
";

    const SELF_STAT: &str = "4242 (burnrated) S 1 4242 4242 0 -1 4194560 1520 0 0 0 731 42 0 0 20 0 9 0 123456 123456789 2048 18446744073709551615";

    #[test]
    fn total_sums_first_eight_columns() {
        let expected = 10132153 + 290696 + 3084719 + 46828483 + 16683 + 0 + 25195 + 0;
        assert_eq!(parse_total_jiffies(PROC_STAT), Some(expected));
    }

    #[test]
    fn total_accepts_short_legacy_line() {
        assert_eq!(parse_total_jiffies("cpu  1 2 3 4\n"), Some(10));
    }

    #[test]
    fn total_rejects_garbage() {
        assert_eq!(parse_total_jiffies(""), None);
        assert_eq!(parse_total_jiffies("cpu0 1 2 3 4\n"), None);
        assert_eq!(parse_total_jiffies("cpu  1 2 x 4\n"), None);
        assert_eq!(parse_total_jiffies("cpu  1 2\n"), None);
    }

    #[test]
    fn process_reads_utime_and_stime() {
        assert_eq!(parse_process_jiffies(SELF_STAT), Some(731 + 42));
    }

    #[test]
    fn process_survives_spaces_and_parens_in_comm() {
        let stat = "77 (my (weird) proc) R 1 77 77 0 -1 0 0 0 0 0 10 5 0 0 20 0 1 0 1 1 1";
        assert_eq!(parse_process_jiffies(stat), Some(15));
    }

    #[test]
    fn process_rejects_truncated_stat() {
        assert_eq!(parse_process_jiffies("77 (sh) R 1 77"), None);
        assert_eq!(parse_process_jiffies("no parens at all"), None);
    }

    #[test]
    fn read_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let stat = dir.path().join("stat");
        let self_stat = dir.path().join("self_stat");
        std::fs::write(&stat, "cpu  100 0 50 850 0 0 0 0\n").unwrap();
        std::fs::write(&self_stat, SELF_STAT).unwrap();

        let counters = ProcfsCounters::new(&stat, &self_stat);
        assert_eq!(counters.read(), CpuSample::new(1000, 773));
    }

    #[test]
    fn missing_files_read_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let counters = ProcfsCounters::new(dir.path().join("nope"), dir.path().join("nada"));
        assert_eq!(counters.read(), CpuSample::default());
    }

    #[test]
    fn malformed_file_zeroes_only_its_component() {
        let dir = tempfile::tempdir().unwrap();
        let stat = dir.path().join("stat");
        let self_stat = dir.path().join("self_stat");
        std::fs::write(&stat, "garbage\n").unwrap();
        std::fs::write(&self_stat, SELF_STAT).unwrap();

        let counters = ProcfsCounters::new(&stat, &self_stat);
        assert_eq!(counters.read(), CpuSample::new(0, 773));
    }
}
