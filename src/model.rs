//! FE Model - subdomain container and dof bookkeeping
//!
//! The transient analyzer only needs the model to wire itself up, number its
//! free dofs and produce the static load vector of each subdomain. Operators
//! live with the integration provider.

use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{FEAError, FEAResult};
use crate::math::Vec as FEVec;

/// Stable identifier of a subdomain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubdomainId(pub usize);

impl fmt::Display for SubdomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Setup contract the transient analyzer drives before stepping
pub trait StructuralModel {
    /// Wire internal references and validate the model
    fn connect_data_structures(&mut self) -> FEAResult<()>;

    /// Number the free dofs of every subdomain
    fn order_dofs(&mut self) -> FEAResult<()>;

    /// Build the static load vector of every subdomain
    fn assign_loads(&mut self) -> FEAResult<()>;

    /// Static load vector of a subdomain in free-dof numbering
    fn forces(&self, id: SubdomainId) -> FEAResult<FEVec>;
}

/// Concentrated load on a single subdomain dof
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeLoad {
    /// Dof index in the unconstrained numbering
    pub dof: usize,
    pub value: f64,
}

impl NodeLoad {
    pub fn new(dof: usize, value: f64) -> Self {
        Self { dof, value }
    }
}

/// A subdomain: a block of dofs, its supports and static loads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subdomain {
    pub id: SubdomainId,
    pub name: String,
    /// Total dofs before constraints are removed
    pub num_dofs: usize,
    /// Constrained dofs
    #[serde(default)]
    pub supports: Vec<usize>,
    /// Static loads
    #[serde(default)]
    pub loads: Vec<NodeLoad>,
}

/// Reference model: named subdomains with supports and nodal loads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FEModel {
    /// Subdomains, indexed by their id
    pub subdomains: Vec<Subdomain>,

    #[serde(skip)]
    names: HashMap<String, SubdomainId>,
    /// Equation number of every dof, `None` when constrained
    #[serde(skip)]
    equations: Vec<Vec<Option<usize>>>,
    #[serde(skip)]
    forces: Vec<FEVec>,
    #[serde(skip)]
    connected: bool,
}

impl FEModel {
    /// Create a new empty model
    pub fn new() -> Self {
        Self::default()
    }

    // ========================
    // Model Building Methods
    // ========================

    /// Add a subdomain with `num_dofs` unconstrained dofs
    pub fn add_subdomain(&mut self, name: &str, num_dofs: usize) -> FEAResult<SubdomainId> {
        if self.names.contains_key(name) || self.subdomains.iter().any(|s| s.name == name) {
            return Err(FEAError::DuplicateName(name.to_string()));
        }
        if num_dofs == 0 {
            return Err(FEAError::InvalidInput(format!(
                "subdomain '{}' must have at least one dof",
                name
            )));
        }

        let id = SubdomainId(self.subdomains.len());
        self.subdomains.push(Subdomain {
            id,
            name: name.to_string(),
            num_dofs,
            supports: Vec::new(),
            loads: Vec::new(),
        });
        self.names.insert(name.to_string(), id);
        self.invalidate();
        Ok(id)
    }

    /// Constrain a dof of a subdomain
    pub fn add_support(&mut self, subdomain: &str, dof: usize) -> FEAResult<()> {
        let sub = self.subdomain_by_name_mut(subdomain)?;
        if dof >= sub.num_dofs {
            return Err(FEAError::InvalidInput(format!(
                "support dof {} out of range for subdomain '{}' ({} dofs)",
                dof, subdomain, sub.num_dofs
            )));
        }
        if !sub.supports.contains(&dof) {
            sub.supports.push(dof);
        }
        self.invalidate();
        Ok(())
    }

    /// Add a static nodal load to a subdomain
    pub fn add_node_load(&mut self, subdomain: &str, load: NodeLoad) -> FEAResult<()> {
        let sub = self.subdomain_by_name_mut(subdomain)?;
        sub.loads.push(load);
        self.invalidate();
        Ok(())
    }

    // ========================
    // Queries
    // ========================

    /// Look a subdomain up by name
    pub fn subdomain_id(&self, name: &str) -> Option<SubdomainId> {
        self.names
            .get(name)
            .copied()
            .or_else(|| self.subdomains.iter().find(|s| s.name == name).map(|s| s.id))
    }

    pub fn subdomain(&self, id: SubdomainId) -> FEAResult<&Subdomain> {
        self.subdomains
            .get(id.0)
            .ok_or(FEAError::SubdomainNotFound(id))
    }

    /// Number of unconstrained dofs of a subdomain
    pub fn num_free_dofs(&self, id: SubdomainId) -> FEAResult<usize> {
        let sub = self.subdomain(id)?;
        let mut constrained = sub.supports.clone();
        constrained.sort_unstable();
        constrained.dedup();
        Ok(sub.num_dofs.saturating_sub(constrained.len()))
    }

    /// Equation number of `dof`, available once dofs are ordered
    pub fn equation_number(&self, id: SubdomainId, dof: usize) -> Option<usize> {
        self.equations.get(id.0)?.get(dof).copied().flatten()
    }

    /// Whether dofs are numbered and loads assigned
    pub fn is_prepared(&self) -> bool {
        self.connected && self.forces.len() == self.subdomains.len() && !self.subdomains.is_empty()
    }

    fn subdomain_by_name_mut(&mut self, name: &str) -> FEAResult<&mut Subdomain> {
        let id = self
            .subdomain_id(name)
            .ok_or_else(|| FEAError::InvalidInput(format!("subdomain '{}' not found", name)))?;
        Ok(&mut self.subdomains[id.0])
    }

    fn invalidate(&mut self) {
        self.connected = false;
        self.equations.clear();
        self.forces.clear();
    }
}

impl StructuralModel for FEModel {
    fn connect_data_structures(&mut self) -> FEAResult<()> {
        if self.subdomains.is_empty() {
            return Err(FEAError::Configuration("model has no subdomains".to_string()));
        }

        // Rebuild the name index (lost on deserialization)
        self.names.clear();
        for (index, sub) in self.subdomains.iter_mut().enumerate() {
            sub.id = SubdomainId(index);
            if self.names.insert(sub.name.clone(), sub.id).is_some() {
                return Err(FEAError::DuplicateName(sub.name.clone()));
            }
            if let Some(&dof) = sub.supports.iter().find(|&&d| d >= sub.num_dofs) {
                return Err(FEAError::InvalidInput(format!(
                    "support dof {} out of range for subdomain '{}'",
                    dof, sub.name
                )));
            }
            if let Some(load) = sub.loads.iter().find(|l| l.dof >= sub.num_dofs) {
                return Err(FEAError::InvalidInput(format!(
                    "load dof {} out of range for subdomain '{}'",
                    load.dof, sub.name
                )));
            }
        }

        self.connected = true;
        debug!("Connected {} subdomain(s)", self.subdomains.len());
        Ok(())
    }

    fn order_dofs(&mut self) -> FEAResult<()> {
        if !self.connected {
            return Err(FEAError::Configuration(
                "connect_data_structures must run before order_dofs".to_string(),
            ));
        }

        self.equations = self
            .subdomains
            .iter()
            .map(|sub| {
                let mut next = 0;
                (0..sub.num_dofs)
                    .map(|dof| {
                        if sub.supports.contains(&dof) {
                            None
                        } else {
                            next += 1;
                            Some(next - 1)
                        }
                    })
                    .collect::<Vec<Option<usize>>>()
            })
            .collect();

        for (sub, equations) in self.subdomains.iter().zip(&self.equations) {
            debug!(
                "Subdomain {} ('{}'): {} free of {} dofs",
                sub.id,
                sub.name,
                equations.iter().flatten().count(),
                sub.num_dofs
            );
        }
        Ok(())
    }

    fn assign_loads(&mut self) -> FEAResult<()> {
        if self.equations.len() != self.subdomains.len() {
            return Err(FEAError::Configuration(
                "order_dofs must run before assign_loads".to_string(),
            ));
        }

        let mut forces = Vec::with_capacity(self.subdomains.len());
        for (sub, equations) in self.subdomains.iter().zip(&self.equations) {
            let free = equations.iter().flatten().count();
            let mut f = FEVec::zeros(free);
            for load in &sub.loads {
                match equations[load.dof] {
                    Some(eq) => f[eq] += load.value,
                    None => warn!(
                        "Load on constrained dof {} of subdomain '{}' is ignored",
                        load.dof, sub.name
                    ),
                }
            }
            forces.push(f);
        }

        self.forces = forces;
        Ok(())
    }

    fn forces(&self, id: SubdomainId) -> FEAResult<FEVec> {
        if id.0 >= self.subdomains.len() {
            return Err(FEAError::SubdomainNotFound(id));
        }
        self.forces
            .get(id.0)
            .cloned()
            .ok_or_else(|| FEAError::Configuration("loads have not been assigned".to_string()))
    }
}
