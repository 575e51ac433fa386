// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::object_ref::{ObjectKey, ObjectRef};
use kube_core::ErrorResponse;
use thiserror::Error;

/// APIError is the store-level failure of a single read or write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum APIError {
    #[error("object not found")]
    ObjectNotFound,
    #[error("object already exists")]
    ObjectAlreadyExists,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("transient: {0}")]
    Transient(String),
}

pub fn kube_error_to_api_error(error: &kube::Error) -> APIError {
    match error {
        kube::Error::Api(ErrorResponse {
            code,
            reason,
            message,
            ..
        }) => match *code {
            404 => APIError::ObjectNotFound,
            409 if reason == "AlreadyExists" => APIError::ObjectAlreadyExists,
            409 => APIError::Conflict(message.clone()),
            400 | 422 => APIError::Invalid(message.clone()),
            401 | 403 => APIError::Forbidden(message.clone()),
            _ => APIError::Transient(message.clone()),
        },
        other => APIError::Transient(other.to_string()),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("MissingObjectKey: {0}")]
    MissingObjectKey(&'static str),

    #[error("Invalid RabbitmqCluster spec: {0}")]
    InvalidSpec(String),

    #[error("Desired state violates invariant: {0}")]
    Validation(String),

    #[error("Failed to get {0}: {1}")]
    GetClusterFailed(ObjectKey, #[source] APIError),

    #[error("Failed to get {0}: {1}")]
    GetFailed(ObjectRef, #[source] APIError),

    #[error("Failed to create {0}: {1}")]
    CreateFailed(ObjectRef, #[source] APIError),

    #[error("Failed to update {0}: {1}")]
    UpdateFailed(ObjectRef, #[source] APIError),

    #[error("Failed to update status of {0}: {1}")]
    StatusUpdateFailed(ObjectKey, #[source] APIError),

    #[error("Reconcile cancelled")]
    Cancelled,
}

/// How the driver reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Stale resource version; retried once, then requeued.
    Conflict,
    Transient,
    Fatal,
}

impl Error {
    pub fn api_error(&self) -> Option<&APIError> {
        match self {
            Error::GetClusterFailed(_, e)
            | Error::GetFailed(_, e)
            | Error::CreateFailed(_, e)
            | Error::UpdateFailed(_, e)
            | Error::StatusUpdateFailed(_, e) => Some(e),
            _ => None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Cancelled => ErrorClass::Transient,
            Error::MissingObjectKey(_) | Error::InvalidSpec(_) | Error::Validation(_) => {
                ErrorClass::Fatal
            }
            _ => match self.api_error() {
                Some(APIError::Conflict(_)) => ErrorClass::Conflict,
                // A racing writer created or deleted the object between our read and write.
                Some(APIError::ObjectNotFound)
                | Some(APIError::ObjectAlreadyExists)
                | Some(APIError::Transient(_)) => ErrorClass::Transient,
                Some(APIError::Invalid(_)) | Some(APIError::Forbidden(_)) | None => {
                    ErrorClass::Fatal
                }
            },
        }
    }
}
