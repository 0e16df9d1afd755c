//! Gateway filter trait and filter ordering.
//!
//! A filter chain is an ordered list of [`GatewayFilter`] instances applied
//! to every request and response.  Filters are sorted by their declared
//! [`FilterOrder`] and executed in ascending order on the request path
//! (lowest value first) and descending order on the response path.
//!
//! ```text
//! Request  ──► PreProcess ──► Admission ──► Routing ──► Logging
//!                  (upstream call happens here)
//! Response ◄── Logging ◄── Routing ◄── Admission ◄── PreProcess
//! ```

use super::error::GatewayError;
use super::types::{GatewayContext, GatewayResponse};
use async_trait::async_trait;

// ─────────────────────────────────────────────────────────────────────────────
// Filter ordering
// ─────────────────────────────────────────────────────────────────────────────

/// Numeric ordering slot for a filter in the chain.
///
/// Any `u32` value is accepted so implementors can slot in custom filters
/// between the standard phases.  Filters with equal order values are executed
/// in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FilterOrder(pub u32);

impl FilterOrder {
    /// Executes before admission control (e.g. request id injection).
    pub const PRE_PROCESS: FilterOrder = FilterOrder(0);
    /// Admission control (token-bucket throttling) slot.
    pub const ADMISSION: FilterOrder = FilterOrder(200);
    /// Routing decision slot, runs only for admitted requests.
    pub const ROUTING: FilterOrder = FilterOrder(300);
    /// Access logging slot.
    pub const LOGGING: FilterOrder = FilterOrder(400);
}

// ─────────────────────────────────────────────────────────────────────────────
// Filter action
// ─────────────────────────────────────────────────────────────────────────────

/// Instruction returned by [`GatewayFilter::on_request`] controlling what
/// the gateway does with the request after the filter runs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FilterAction {
    /// Pass the (possibly modified) request to the next filter or upstream.
    Continue,
    /// Short-circuit the chain and return a synthetic error response with the
    /// given HTTP status, machine-readable code and message.
    Reject {
        status: u16,
        code: &'static str,
        message: String,
    },
    /// Short-circuit silently: the caller is gone, nothing is forwarded and
    /// no response is produced.
    Abandon,
}

impl FilterAction {
    /// Convenience constructor for [`FilterAction::Reject`].
    pub fn reject(status: u16, code: &'static str, message: impl Into<String>) -> Self {
        FilterAction::Reject {
            status,
            code,
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayFilter trait
// ─────────────────────────────────────────────────────────────────────────────

/// Kernel contract for a single filter in the gateway pipeline.
///
/// Implementations must be `Send + Sync` so they can be shared across Tokio
/// tasks without additional synchronization by the caller.  No filter may
/// block the calling thread: every wait is an `.await`.
#[async_trait]
pub trait GatewayFilter: Send + Sync {
    /// Stable, human-readable identifier for this filter (used in logs).
    fn name(&self) -> &str;

    /// Position in the filter chain.  Lower values execute first on the
    /// request path.
    fn order(&self) -> FilterOrder;

    /// Called with the inbound request *before* it is forwarded upstream.
    ///
    /// Return [`FilterAction::Continue`] to proceed, or `Reject`/`Abandon`
    /// to short-circuit the chain.
    async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, GatewayError>;

    /// Called with the upstream response *before* it is returned to the caller.
    async fn on_response(
        &self,
        _ctx: &GatewayContext,
        _resp: &mut GatewayResponse,
    ) -> Result<(), GatewayError> {
        Ok(())
    }
}
