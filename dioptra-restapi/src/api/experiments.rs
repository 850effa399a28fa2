//! Experiments: named, versioned groupings of jobs

use super::resource::{NamedFields, ResourceKind};
use crate::db::resources::ResourceType;

pub struct Experiments;

impl ResourceKind for Experiments {
    const TYPE: ResourceType = ResourceType::Experiment;
    type Fields = NamedFields;
}
