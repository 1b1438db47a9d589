//! Link endpoints as seen by the channel and beamforming code

use std::fmt;

use crate::antenna::AntennaArray;
use crate::geometry::Vector3;

/// Host-assigned node identity, the input to every pairing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn as_key(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position and velocity snapshot supplied by the host mobility model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpoint {
    pub id: NodeId,
    pub position: Vector3,
    pub velocity: Vector3,
}

impl Endpoint {
    pub fn new(id: NodeId, position: Vector3) -> Self {
        Self {
            id,
            position,
            velocity: Vector3::default(),
        }
    }

    pub fn with_velocity(mut self, velocity: Vector3) -> Self {
        self.velocity = velocity;
        self
    }
}

/// A radio: endpoint plus the antenna array mounted on it
#[derive(Debug, Clone)]
pub struct Device {
    pub endpoint: Endpoint,
    pub antenna: AntennaArray,
}

impl Device {
    pub fn new(endpoint: Endpoint, antenna: AntennaArray) -> Self {
        Self { endpoint, antenna }
    }

    pub fn id(&self) -> NodeId {
        self.endpoint.id
    }

    pub fn position(&self) -> Vector3 {
        self.endpoint.position
    }

    pub fn velocity(&self) -> Vector3 {
        self.endpoint.velocity
    }
}
