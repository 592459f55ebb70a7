use crate::math::Vec as FEVec;

/// Per-subdomain kinematic state of the Newmark scheme
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicState {
    /// Displacement at the previous step
    pub u: FEVec,
    /// Displacement at the current step
    pub v: FEVec,
    /// Velocity
    pub v1: FEVec,
    /// Acceleration
    pub v2: FEVec,
    /// `a0·v + a2·v1 + a3·v2`
    pub uu: FEVec,
    /// `a1·v + a4·v1 + a5·v2`
    pub uc: FEVec,
    /// `M · uu`
    pub uum: FEVec,
    /// `C · uc`
    pub ucc: FEVec,
    /// Externally applied load of the current step
    pub rhs: FEVec,
}

impl KinematicState {
    pub fn zeros(size: usize) -> Self {
        Self {
            u: FEVec::zeros(size),
            v: FEVec::zeros(size),
            v1: FEVec::zeros(size),
            v2: FEVec::zeros(size),
            uu: FEVec::zeros(size),
            uc: FEVec::zeros(size),
            uum: FEVec::zeros(size),
            ucc: FEVec::zeros(size),
            rhs: FEVec::zeros(size),
        }
    }

    pub fn size(&self) -> usize {
        self.v.len()
    }

    /// Current displacement
    pub fn displacement(&self) -> &FEVec {
        &self.v
    }

    pub fn velocity(&self) -> &FEVec {
        &self.v1
    }

    pub fn acceleration(&self) -> &FEVec {
        &self.v2
    }
}
