/*!
Launch dimensions.

Kernels are launched with a grid (number of work-groups) and a block (size of one work-group),
each with an x, y and z extent. OpenCL instead takes a work dimension in `1..=3` and the global and
local sizes for each used dimension. [`validate`] translates the former into the latter.

```
# use oclc_core::dim::{validate, Dim3};
let work_dims = validate(Dim3::new(8, 0, 0), Dim3::new(32, 0, 0)).unwrap();
assert_eq!(work_dims.work_dim(), 1);
assert_eq!(work_dims.global()[0], 256);
assert_eq!(work_dims.local()[0], 32);
```
*/

use bytemuck::{Pod, Zeroable};

/// Errors.
pub mod error {
    use super::Axis;

    /// A grid / block pair that can not be dispatched.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
    pub enum WorkDimError {
        /// grid.x * block.x is 0.
        #[error("no work in x dimension")]
        NoWorkInX,
        /// Exactly one of grid and block is 0 for `axis`.
        #[error("inconsistent work dimensions: grid.{axis} and block.{axis} must both be zero or both be non-zero")]
        Inconsistent { axis: Axis },
        /// `axis` has work but a lower axis does not.
        #[error("inconsistent work dimensions: {axis} has work but a lower dimension does not")]
        NotContiguous { axis: Axis },
        /// grid * block does not fit in `usize`.
        #[error("global work size of {axis} overflows")]
        Overflow { axis: Axis },
    }
}
use error::WorkDimError;

/// An axis of a [`Dim3`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Axis {
    #[display(fmt = "x")]
    X,
    #[display(fmt = "y")]
    Y,
    #[display(fmt = "z")]
    Z,
}

impl Axis {
    const ALL: [Self; 3] = [Self::X, Self::Y, Self::Z];
    fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

/// Three extents, laid out like the C `dim3` struct.
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Default,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Pod,
    Zeroable,
    derive_more::Display,
)]
#[display(fmt = "({}, {}, {})", x, y, z)]
pub struct Dim3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dim3 {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
    pub fn get(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

impl From<[u32; 3]> for Dim3 {
    fn from([x, y, z]: [u32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<u32> for Dim3 {
    fn from(x: u32) -> Self {
        Self { x, y: 0, z: 0 }
    }
}

/// The NDRange of a validated launch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkDims {
    work_dim: u32,
    global: [usize; 3],
    local: [usize; 3],
}

impl WorkDims {
    /// The number of used dimensions, 1, 2 or 3.
    pub fn work_dim(&self) -> u32 {
        self.work_dim
    }
    /// Global work size per dimension, 1 past `work_dim`.
    pub fn global(&self) -> &[usize; 3] {
        &self.global
    }
    /// Local (work-group) size per dimension, 1 past `work_dim`.
    pub fn local(&self) -> &[usize; 3] {
        &self.local
    }
}

/** Validates a launch and computes its NDRange.

An axis is active when `grid * block` is not zero. The checks are, in order:
- x must be active.
- grid and block must both be zero or both be non-zero on every axis.
- active axes must be a prefix starting at x, ie z requires y.
- grid * block must fit in `usize`, which only fails on 32 bit targets.

**errors**
- [`WorkDimError`]
*/
pub fn validate(grid: Dim3, block: Dim3) -> Result<WorkDims, WorkDimError> {
    let active = |axis| grid.get(axis) != 0 && block.get(axis) != 0;
    if !active(Axis::X) {
        return Err(WorkDimError::NoWorkInX);
    }
    for axis in Axis::ALL {
        if (grid.get(axis) == 0) != (block.get(axis) == 0) {
            return Err(WorkDimError::Inconsistent { axis });
        }
    }
    let mut work_dim = 0;
    let mut global = [1; 3];
    let mut local = [1; 3];
    for axis in Axis::ALL {
        if active(axis) {
            if axis.index() != work_dim {
                return Err(WorkDimError::NotContiguous { axis });
            }
            let groups = grid.get(axis) as usize;
            let threads = block.get(axis) as usize;
            global[work_dim] = groups
                .checked_mul(threads)
                .ok_or(WorkDimError::Overflow { axis })?;
            local[work_dim] = threads;
            work_dim += 1;
        }
    }
    Ok(WorkDims {
        work_dim: work_dim as u32,
        global,
        local,
    })
}
