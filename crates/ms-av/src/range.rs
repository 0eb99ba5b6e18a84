//! Byte-range selection policy.
//!
//! Probing needs only header/metadata atoms, so a bounded read keeps peak
//! memory flat; export needs every sample of the target stream, so it
//! reads the full file or the largest affordable prefix. Window sizes
//! shrink under memory pressure.

use ms_core::config::RangeConfig;
use ms_core::ContainerFamily;

/// The operation a byte range is being selected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Metadata probe; a bounded window suffices.
    Probe,
    /// Stream or subtitle export; every sample byte is needed.
    Export,
}

/// A contiguous byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Offset of the first byte.
    pub offset: u64,
    /// Number of bytes to read.
    pub len: u64,
}

impl ByteRange {
    /// One past the last byte.
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// The ranges to read for one operation.
#[derive(Debug, Clone)]
pub struct RangePlan {
    /// Ranges to read and concatenate, in order.
    pub ranges: Vec<ByteRange>,
    /// `false` only when the plan had to truncate an export to the largest
    /// affordable prefix; the backend may then fail to complete, which is
    /// a disclosed limitation rather than a silent one.
    pub complete: bool,
}

impl RangePlan {
    fn whole(file_len: u64) -> Self {
        Self {
            ranges: vec![ByteRange {
                offset: 0,
                len: file_len,
            }],
            complete: true,
        }
    }

    /// Total number of bytes the plan will read.
    pub fn total_len(&self) -> u64 {
        self.ranges.iter().map(|r| r.len).sum()
    }
}

/// Window size after memory-pressure scaling, floored at the configured
/// minimum chunk.
fn scaled(base: u64, cfg: &RangeConfig) -> u64 {
    (base >> cfg.pressure.shift()).max(cfg.min_chunk_bytes)
}

/// Select the byte ranges to read for an operation on a file.
///
/// A file smaller than the intended chunk is always read whole, and no
/// returned range ever exceeds the file's length.
pub fn select_ranges(
    operation: Operation,
    family: ContainerFamily,
    file_len: u64,
    cfg: &RangeConfig,
) -> RangePlan {
    match operation {
        Operation::Export => {
            if file_len <= cfg.export_buffer_limit {
                RangePlan::whole(file_len)
            } else {
                RangePlan {
                    ranges: vec![ByteRange {
                        offset: 0,
                        len: cfg.export_buffer_limit,
                    }],
                    complete: false,
                }
            }
        }
        Operation::Probe => match family {
            ContainerFamily::IsoBmff => {
                if file_len <= cfg.probe_whole_file_limit {
                    return RangePlan::whole(file_len);
                }
                let window = scaled(cfg.probe_window_bytes, cfg);
                // Metadata can sit at either end; read head, middle and
                // tail windows. When the windows would cover most of the
                // file anyway, reading it whole is strictly cheaper.
                if window.saturating_mul(3) >= file_len {
                    return RangePlan::whole(file_len);
                }
                let middle = (file_len - window) / 2;
                RangePlan {
                    ranges: vec![
                        ByteRange {
                            offset: 0,
                            len: window,
                        },
                        ByteRange {
                            offset: middle,
                            len: window,
                        },
                        ByteRange {
                            offset: file_len - window,
                            len: window,
                        },
                    ],
                    complete: true,
                }
            }
            ContainerFamily::Other => {
                // Metadata atoms are assumed to precede sample data.
                let prefix = scaled(cfg.probe_prefix_bytes, cfg);
                if file_len <= prefix {
                    RangePlan::whole(file_len)
                } else {
                    RangePlan {
                        ranges: vec![ByteRange {
                            offset: 0,
                            len: prefix,
                        }],
                        complete: true,
                    }
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_core::config::MemoryPressure;

    const MIB: u64 = 1024 * 1024;

    fn cfg() -> RangeConfig {
        RangeConfig::default()
    }

    fn assert_in_bounds(plan: &RangePlan, file_len: u64) {
        for range in &plan.ranges {
            assert!(
                range.end() <= file_len,
                "range {range:?} exceeds file length {file_len}"
            );
        }
    }

    #[test]
    fn small_files_always_read_whole() {
        for family in [ContainerFamily::IsoBmff, ContainerFamily::Other] {
            for op in [Operation::Probe, Operation::Export] {
                let plan = select_ranges(op, family, 1000, &cfg());
                assert_eq!(plan.ranges.len(), 1);
                assert_eq!(plan.ranges[0].offset, 0);
                assert_eq!(plan.ranges[0].len, 1000);
                assert!(plan.complete);
            }
        }
    }

    #[test]
    fn ranges_never_exceed_file_length() {
        let sizes = [0, 1, 4 * MIB, 64 * MIB, 65 * MIB, 500 * MIB, 5 * 1024 * MIB];
        for file_len in sizes {
            for family in [ContainerFamily::IsoBmff, ContainerFamily::Other] {
                for op in [Operation::Probe, Operation::Export] {
                    let plan = select_ranges(op, family, file_len, &cfg());
                    assert_in_bounds(&plan, file_len);
                }
            }
        }
    }

    #[test]
    fn large_iso_bmff_probe_uses_three_windows() {
        let file_len = 500 * MIB;
        let plan = select_ranges(Operation::Probe, ContainerFamily::IsoBmff, file_len, &cfg());
        assert_eq!(plan.ranges.len(), 3);
        assert_eq!(plan.ranges[0].offset, 0);
        assert_eq!(plan.ranges[2].end(), file_len);
        for range in &plan.ranges {
            assert_eq!(range.len, 64 * MIB);
        }
        assert!(plan.complete);
    }

    #[test]
    fn iso_bmff_probe_windows_shrink_under_pressure() {
        let mut c = cfg();
        c.pressure = MemoryPressure::Critical;
        let plan = select_ranges(Operation::Probe, ContainerFamily::IsoBmff, 500 * MIB, &c);
        for range in &plan.ranges {
            assert_eq!(range.len, 16 * MIB);
        }
    }

    #[test]
    fn pressure_scaling_respects_floor() {
        let mut c = cfg();
        c.pressure = MemoryPressure::Critical;
        c.probe_prefix_bytes = 16 * MIB;
        c.min_chunk_bytes = 8 * MIB;
        // 16 MiB >> 2 = 4 MiB, floored at 8 MiB.
        let plan = select_ranges(Operation::Probe, ContainerFamily::Other, 500 * MIB, &c);
        assert_eq!(plan.ranges[0].len, 8 * MIB);
    }

    #[test]
    fn other_container_probe_reads_prefix() {
        let plan = select_ranges(Operation::Probe, ContainerFamily::Other, 500 * MIB, &cfg());
        assert_eq!(plan.ranges.len(), 1);
        assert_eq!(plan.ranges[0].offset, 0);
        assert_eq!(plan.ranges[0].len, 32 * MIB);
        assert!(plan.complete);
    }

    #[test]
    fn export_reads_whole_file() {
        let plan = select_ranges(Operation::Export, ContainerFamily::Other, 500 * MIB, &cfg());
        assert_eq!(plan.ranges.len(), 1);
        assert_eq!(plan.total_len(), 500 * MIB);
        assert!(plan.complete);
    }

    #[test]
    fn oversized_export_truncates_and_discloses() {
        let mut c = cfg();
        c.export_buffer_limit = 100 * MIB;
        let plan = select_ranges(Operation::Export, ContainerFamily::IsoBmff, 500 * MIB, &c);
        assert_eq!(plan.total_len(), 100 * MIB);
        assert!(!plan.complete);
    }

    #[test]
    fn near_threshold_iso_bmff_reads_whole() {
        // Just above the whole-file limit, three 64 MiB windows would
        // cover more than the file; reading whole is cheaper.
        let plan = select_ranges(
            Operation::Probe,
            ContainerFamily::IsoBmff,
            65 * MIB,
            &cfg(),
        );
        assert_eq!(plan.ranges.len(), 1);
        assert_eq!(plan.total_len(), 65 * MIB);
    }
}
