// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::resource::SubResource;
use std::fmt;

/// ObjectKey identifies a RabbitmqCluster by namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> ObjectKey {
        ObjectKey {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RabbitmqCluster/{}/{}", self.namespace, self.name)
    }
}

/// ObjectRef identifies one child resource of a RabbitmqCluster.
///
/// Two refs with different sub resources may still name the same Kubernetes object
/// (e.g., two Services with the same name), so stores key objects by
/// `(resource.kind(), namespace, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub resource: SubResource,
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(
        resource: SubResource,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> ObjectRef {
        ObjectRef {
            resource,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.resource.kind()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind(), self.namespace, self.name)
    }
}
