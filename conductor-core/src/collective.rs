//! Thin abstraction over the MPI collectives the core requires.
//!
//! Every core operation that touches more than one rank's data goes through
//! this trait rather than calling into `mpi` directly. That keeps the
//! capacitance/classifier/corrector code testable on a single process (via
//! [`SingleRank`]) while [`MpiCollective`] provides the real, multi-process
//! implementation built on top of the `mpi` crate (rsmpi).
//!
//! Per spec §5, every method here is a blocking, whole-communicator
//! synchronization point: all ranks must enter the same call with matching
//! argument shapes.

use crate::error::{CoreError, CoreResult};

/// The MPI-collective operations consumed by the object subsystem.
pub trait Collective {
    /// This rank's zero-based index.
    fn rank(&self) -> i32;

    /// Total number of ranks in the communicator.
    fn size(&self) -> i32;

    /// Gathers `value` from every rank into a `size()`-length vector, ordered
    /// by rank. Used to build the per-rank surface-node counts in C3.
    fn all_gather_i64(&self, value: i64) -> CoreResult<Vec<i64>>;

    /// Elementwise sum-reduces `values` across all ranks; every rank receives
    /// the same result. Used by C4's capacitance assembly and C5/C6's charge
    /// corrections.
    fn all_reduce_sum_f64(&self, values: &[f64]) -> CoreResult<Vec<f64>>;

    /// Reduces a single `f64` by summation across all ranks.
    fn all_reduce_sum_f64_scalar(&self, value: f64) -> CoreResult<f64> {
        Ok(self.all_reduce_sum_f64(&[value])?[0])
    }

    /// Reduces a single `i64` by taking the maximum across all ranks. Used by
    /// C1 to determine the global object count `N`.
    fn all_reduce_max_i64(&self, value: i64) -> CoreResult<i64>;
}

/// Single-process stand-in for [`Collective`] used by unit tests and by
/// callers that genuinely run with one rank. Every collective degenerates to
/// the local value; no network or MPI runtime is involved.
#[derive(Copy, Clone, Debug, Default)]
pub struct SingleRank;

impl Collective for SingleRank {
    fn rank(&self) -> i32 {
        0
    }

    fn size(&self) -> i32 {
        1
    }

    fn all_gather_i64(&self, value: i64) -> CoreResult<Vec<i64>> {
        Ok(vec![value])
    }

    fn all_reduce_sum_f64(&self, values: &[f64]) -> CoreResult<Vec<f64>> {
        Ok(values.to_vec())
    }

    fn all_reduce_max_i64(&self, value: i64) -> CoreResult<i64> {
        Ok(value)
    }
}

/// Production implementation backed by an `mpi` crate communicator.
///
/// Only compiled against real MPI ranks; wraps `mpi::topology::SimpleCommunicator`
/// (obtained from `mpi::initialize()` in the hosting application, typically
/// once in `main`). Kept as a thin wrapper so the rest of the crate never
/// names an `mpi` type directly outside this module.
pub struct MpiCollective<'a> {
    world: &'a mpi::topology::SimpleCommunicator,
}

impl<'a> MpiCollective<'a> {
    pub fn new(world: &'a mpi::topology::SimpleCommunicator) -> Self {
        Self { world }
    }
}

impl<'a> Collective for MpiCollective<'a> {
    fn rank(&self) -> i32 {
        use mpi::traits::Communicator;
        self.world.rank()
    }

    fn size(&self) -> i32 {
        use mpi::traits::Communicator;
        self.world.size()
    }

    fn all_gather_i64(&self, value: i64) -> CoreResult<Vec<i64>> {
        use mpi::traits::Communicator;
        let size = self.world.size() as usize;
        let mut buf = vec![0i64; size];
        self.world.all_gather_into(&value, &mut buf[..]);
        Ok(buf)
    }

    fn all_reduce_sum_f64(&self, values: &[f64]) -> CoreResult<Vec<f64>> {
        use mpi::collective::SystemOperation;
        use mpi::traits::Communicator;
        let mut out = vec![0.0f64; values.len()];
        self.world
            .all_reduce_into(values, &mut out[..], SystemOperation::sum());
        Ok(out)
    }

    fn all_reduce_max_i64(&self, value: i64) -> CoreResult<i64> {
        use mpi::collective::SystemOperation;
        use mpi::traits::Communicator;
        let mut out = 0i64;
        self.world
            .all_reduce_into(&value, &mut out, SystemOperation::max());
        Ok(out)
    }
}

/// Convenience used by all-reduce call sites that want a `CoreError::Comm`
/// rather than a bare assertion if a participant disagrees on a collective
/// argument shape (e.g. mismatched vector lengths across ranks, which would
/// otherwise deadlock or panic deep inside `mpi`).
pub fn require_equal_len(name: &str, expected: usize, actual: usize) -> CoreResult<()> {
    if expected != actual {
        return Err(CoreError::comm(format!(
            "collective '{name}' called with mismatched length: expected {expected}, got {actual}"
        )));
    }
    Ok(())
}

/// A genuinely multi-rank [`Collective`] for exercising cross-rank properties
/// (spec §8 S4: a capacitance matrix assembled by several ranks must match a
/// single-rank reference) without an MPI runtime. Each virtual rank runs on
/// its own OS thread; every collective blocks on an entry/exit barrier pair
/// so concurrent threads never observe a half-written buffer, and a later
/// call on the same team never races the previous call's readers.
///
/// This is test-only infrastructure, not a production transport: unlike
/// [`MpiCollective`], there is no wire format, just shared memory guarded by
/// barriers. [`ThreadRank::team`] hands out one handle per rank sharing a
/// single team state.
#[cfg(test)]
pub(crate) struct ThreadRank {
    rank: i32,
    state: std::sync::Arc<ThreadTeamState>,
}

#[cfg(test)]
struct ThreadTeamState {
    size: usize,
    gather: std::sync::Mutex<Vec<i64>>,
    gather_entry: std::sync::Barrier,
    gather_exit: std::sync::Barrier,
    reduce_sum: std::sync::Mutex<Vec<Vec<f64>>>,
    reduce_sum_entry: std::sync::Barrier,
    reduce_sum_exit: std::sync::Barrier,
    reduce_max: std::sync::Mutex<Vec<i64>>,
    reduce_max_entry: std::sync::Barrier,
    reduce_max_exit: std::sync::Barrier,
}

#[cfg(test)]
impl ThreadRank {
    /// Builds a team of `size` ranks sharing one synchronization state. Hand
    /// one handle to each of `size` OS threads (e.g. via `std::thread::scope`).
    pub(crate) fn team(size: usize) -> Vec<ThreadRank> {
        let state = std::sync::Arc::new(ThreadTeamState {
            size,
            gather: std::sync::Mutex::new(vec![0i64; size]),
            gather_entry: std::sync::Barrier::new(size),
            gather_exit: std::sync::Barrier::new(size),
            reduce_sum: std::sync::Mutex::new(vec![Vec::new(); size]),
            reduce_sum_entry: std::sync::Barrier::new(size),
            reduce_sum_exit: std::sync::Barrier::new(size),
            reduce_max: std::sync::Mutex::new(vec![0i64; size]),
            reduce_max_entry: std::sync::Barrier::new(size),
            reduce_max_exit: std::sync::Barrier::new(size),
        });
        (0..size)
            .map(|r| ThreadRank {
                rank: r as i32,
                state: std::sync::Arc::clone(&state),
            })
            .collect()
    }
}

#[cfg(test)]
impl Collective for ThreadRank {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn size(&self) -> i32 {
        self.state.size as i32
    }

    fn all_gather_i64(&self, value: i64) -> CoreResult<Vec<i64>> {
        {
            let mut buf = self.state.gather.lock().unwrap();
            buf[self.rank as usize] = value;
        }
        self.state.gather_entry.wait();
        let result = self.state.gather.lock().unwrap().clone();
        self.state.gather_exit.wait();
        Ok(result)
    }

    fn all_reduce_sum_f64(&self, values: &[f64]) -> CoreResult<Vec<f64>> {
        {
            let mut buf = self.state.reduce_sum.lock().unwrap();
            buf[self.rank as usize] = values.to_vec();
        }
        self.state.reduce_sum_entry.wait();
        let summed = {
            let buf = self.state.reduce_sum.lock().unwrap();
            let mut out = vec![0.0f64; values.len()];
            for contribution in buf.iter() {
                for (o, x) in out.iter_mut().zip(contribution.iter()) {
                    *o += x;
                }
            }
            out
        };
        self.state.reduce_sum_exit.wait();
        Ok(summed)
    }

    fn all_reduce_max_i64(&self, value: i64) -> CoreResult<i64> {
        {
            let mut buf = self.state.reduce_max.lock().unwrap();
            buf[self.rank as usize] = value;
        }
        self.state.reduce_max_entry.wait();
        let max = *self.state.reduce_max.lock().unwrap().iter().max().unwrap();
        self.state.reduce_max_exit.wait();
        Ok(max)
    }
}
