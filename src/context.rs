// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::config::ControllerConfig;
use crate::error::Error;
use crate::object_ref::ObjectKey;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Span};

/// ReconcileContext is everything one reconcile invocation carries besides the store:
/// the owner key, a span every log line is attached to, the process config and a
/// cancellation token checked before each mutation.
pub struct ReconcileContext {
    pub key: ObjectKey,
    pub span: Span,
    pub config: Arc<ControllerConfig>,
    cancel: CancellationToken,
}

impl ReconcileContext {
    pub fn new(
        key: ObjectKey,
        config: Arc<ControllerConfig>,
        cancel: CancellationToken,
    ) -> ReconcileContext {
        let span = info_span!("reconcile", namespace = %key.namespace, name = %key.name);
        ReconcileContext {
            key,
            span,
            config,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
