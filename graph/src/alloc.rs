//! Aliased suballocation of transient resources.
//!
//! Every transient in a graph shares one device-memory block. Offsets are
//! planned with a first-fit-decreasing scan: two resources may share bytes
//! only when their pass intervals are disjoint. Ties break by declaration
//! order, so a rebuilt graph reproduces its offsets bit for bit.

use crate::error::CompileError;
use crate::lifetime::ResourceIndex;
use vermeil_rhi::{Device, MemoryPropertyFlags, RhiDeviceMemory};

/// Minimum placement alignment for planned offsets. The abstract device
/// has no per-resource requirement query, so one conservative figure
/// covers images and buffers alike.
pub const TRANSIENT_ALIGNMENT: u64 = 256;

#[derive(Clone, Debug)]
pub(crate) struct TransientRequest {
    pub resource: ResourceIndex,
    pub size: u64,
    pub align: u64,
    /// First and last pass index touching the resource, inclusive.
    pub first: usize,
    pub last: usize,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct PlannedOffsets {
    /// Parallel to the request list.
    pub offsets: Vec<u64>,
    /// Peak size of the backing block.
    pub total: u64,
}

fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

fn intervals_overlap(a: &TransientRequest, b: &TransientRequest) -> bool {
    a.first <= b.last && b.first <= a.last
}

/// First-fit decreasing by size. For every resource, candidate offsets are
/// zero plus the aligned end offset of each already-placed resource with
/// an overlapping interval; the smallest non-colliding candidate wins.
pub(crate) fn plan_offsets(requests: &[TransientRequest]) -> PlannedOffsets {
    let mut order: Vec<usize> = (0..requests.len()).collect();
    // stable sort: equal sizes keep declaration order
    order.sort_by(|&a, &b| requests[b].size.cmp(&requests[a].size));

    let mut offsets = vec![0u64; requests.len()];
    let mut placed: Vec<usize> = Vec::with_capacity(requests.len());
    let mut total = 0u64;

    for &i in &order {
        let request = &requests[i];
        let mut candidates: Vec<u64> = vec![0];
        for &j in &placed {
            let other = &requests[j];
            if intervals_overlap(request, other) {
                candidates.push(align_up(offsets[j] + other.size, request.align));
            }
        }
        candidates.sort_unstable();

        let offset = candidates
            .into_iter()
            .find(|&candidate| {
                candidate % request.align == 0
                    && placed.iter().all(|&j| {
                        let other = &requests[j];
                        !intervals_overlap(request, other)
                            || candidate + request.size <= offsets[j]
                            || candidate >= offsets[j] + other.size
                    })
            })
            .expect("the aligned end of the furthest overlapping resource always fits");

        offsets[i] = offset;
        total = total.max(offset + request.size);
        placed.push(i);
    }

    PlannedOffsets { offsets, total }
}

/// Per-graph device-memory source for transients. Owns nothing between
/// compiles; the compiled graph keeps the allocation alive.
pub struct TransientAllocator {
    properties: MemoryPropertyFlags,
}

impl TransientAllocator {
    pub fn new() -> TransientAllocator {
        Self::with_properties(MemoryPropertyFlags::DEVICE_LOCAL)
    }

    pub fn with_properties(properties: MemoryPropertyFlags) -> TransientAllocator {
        TransientAllocator { properties }
    }

    /// Issues the single backing allocation, or nothing for an empty plan.
    pub(crate) fn allocate(
        &mut self,
        device: &dyn Device,
        total: u64,
    ) -> Result<Option<Box<dyn RhiDeviceMemory>>, CompileError> {
        if total == 0 {
            return Ok(None);
        }
        let memory_type = device.find_memory_type(!0, self.properties).ok_or(
            vermeil_rhi::RhiError::NoSuitableMemoryType {
                type_filter: !0,
                properties: self.properties,
            },
        )?;
        let memory = device.allocate_memory(total, memory_type)?;
        Ok(Some(memory))
    }
}

impl Default for TransientAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1 << 20;

    fn request(i: usize, size: u64, first: usize, last: usize) -> TransientRequest {
        TransientRequest {
            resource: ResourceIndex::Buffer(i),
            size,
            align: TRANSIENT_ALIGNMENT,
            first,
            last,
        }
    }

    #[test]
    fn disjoint_lifetimes_share_bytes() {
        let requests = [
            request(0, MIB, 0, 0),
            request(1, MIB, 1, 1),
            request(2, MIB, 2, 2),
        ];
        let plan = plan_offsets(&requests);
        assert_eq!(plan.total, MIB);
        assert_eq!(plan.offsets, vec![0, 0, 0]);
    }

    #[test]
    fn pairwise_overlap_sums_sizes() {
        let requests = [
            request(0, MIB, 0, 1),
            request(1, MIB, 0, 2),
            request(2, MIB, 1, 2),
        ];
        let plan = plan_offsets(&requests);
        assert_eq!(plan.total, 3 * MIB);
        // pairwise disjoint byte ranges
        for a in 0..3 {
            for b in (a + 1)..3 {
                let (oa, ob) = (plan.offsets[a], plan.offsets[b]);
                assert!(oa + MIB <= ob || ob + MIB <= oa);
            }
        }
    }

    #[test]
    fn partial_overlap_reuses_freed_range() {
        // a lives [0,1], b lives [1,2] (overlap), c lives [2,3] and can
        // reuse a's bytes.
        let requests = [
            request(0, 2 * MIB, 0, 1),
            request(1, MIB, 1, 2),
            request(2, 2 * MIB, 2, 3),
        ];
        let plan = plan_offsets(&requests);
        assert_eq!(plan.offsets[0], 0);
        assert_eq!(plan.offsets[2], 0);
        assert_eq!(plan.offsets[1], 2 * MIB);
        assert_eq!(plan.total, 3 * MIB);
    }

    #[test]
    fn offsets_respect_alignment() {
        let requests = [
            request(0, 100, 0, 1),
            request(1, 100, 0, 1),
            request(2, 100, 0, 1),
        ];
        let plan = plan_offsets(&requests);
        for &offset in &plan.offsets {
            assert_eq!(offset % TRANSIENT_ALIGNMENT, 0);
        }
        assert_eq!(plan.total, 2 * TRANSIENT_ALIGNMENT + 100);
    }

    #[test]
    fn planning_is_deterministic() {
        let requests = [
            request(0, MIB, 0, 2),
            request(1, MIB, 1, 3),
            request(2, 4 * MIB, 2, 4),
            request(3, MIB, 4, 5),
        ];
        let first = plan_offsets(&requests);
        let second = plan_offsets(&requests);
        assert_eq!(first.offsets, second.offsets);
        assert_eq!(first.total, second.total);
    }

    #[test]
    fn total_never_exceeds_sum_of_sizes() {
        let requests = [
            request(0, 3 * MIB, 0, 4),
            request(1, MIB, 1, 2),
            request(2, 2 * MIB, 3, 4),
            request(3, MIB, 0, 0),
        ];
        let plan = plan_offsets(&requests);
        assert!(plan.total <= 7 * MIB);
    }
}
