//! Interest-rate fix: a two-party deal whose request carries an explicit
//! deadline.
//!
//! The runtime has no receive timeout, so the announcement deadline travels
//! inside the request payload and the counterparty refuses late requests.
//! This is the sanctioned timeout pattern for every protocol in this crate.

use crate::deal::Deal;
use accord_core::{AccordError, Command, Party, SignedTransaction, StateRef, TransactionState, WireTransaction};
use accord_flow::{FlowCtx, FlowResult, Topic};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Topic of the rate-fix deal.
pub const RATE_FIX_TOPIC: &str = "platform.deal.ratefix";

/// Request to fix a rate on a deal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixRequest {
    /// The deal state whose rate is being fixed
    pub subject: StateRef,
    /// Name of the fix (e.g. "LIBOR 3M 2026-09-01")
    pub fix_name: String,
    /// The proposed rate, in basis points
    pub rate_bps: i64,
    /// Deadline after which the counterparty must refuse this request
    pub deadline: SystemTime,
}

impl FixRequest {
    /// True if `now` is past the declared deadline
    pub fn is_late(&self, now: SystemTime) -> bool {
        now > self.deadline
    }
}

/// The rate-fix deal scheme.
#[derive(Default)]
pub struct RateFixDeal;

impl RateFixDeal {
    /// Shared scheme instance
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }

    fn fixed_payload(request: &FixRequest) -> Vec<u8> {
        format!("{}={}", request.fix_name, request.rate_bps).into_bytes()
    }
}

#[async_trait]
impl Deal for RateFixDeal {
    type Payload = FixRequest;

    fn topic(&self) -> Topic {
        Topic::new(RATE_FIX_TOPIC)
    }

    fn check_request(&self, payload: &FixRequest) -> Result<(), String> {
        if payload.is_late(SystemTime::now()) {
            return Err(format!("fix request for {} is past its deadline", payload.fix_name));
        }
        Ok(())
    }

    fn assemble_tx(
        &self,
        ctx: &FlowCtx,
        payload: &FixRequest,
        _primary: &Party,
    ) -> FlowResult<SignedTransaction> {
        let hub = ctx.hub();
        let producer = hub.tx_store.get(&payload.subject.txid)?;
        let current = producer
            .wire
            .outputs
            .get(payload.subject.index as usize)
            .ok_or_else(|| AccordError::invalid(format!("dangling state {}", payload.subject)))?;

        let fixed = TransactionState {
            payload: Self::fixed_payload(payload),
            ..current.clone()
        };
        let signers = current.participants.iter().map(Party::signer_key).collect();
        Ok(SignedTransaction::unsigned(WireTransaction {
            inputs: vec![payload.subject],
            outputs: vec![fixed],
            commands: vec![Command {
                name: "Fix".into(),
                signers,
            }],
            notary: Some(current.notary.clone()),
            time_window: None,
        }))
    }

    fn check_proposal(
        &self,
        _ctx: &FlowCtx,
        payload: &FixRequest,
        tx: &SignedTransaction,
    ) -> Result<(), String> {
        if tx.wire.inputs.as_slice() != [payload.subject] {
            return Err("proposal does not consume the requested deal state".into());
        }
        match tx.wire.outputs.first() {
            Some(output) if output.payload == Self::fixed_payload(payload) => Ok(()),
            Some(_) => Err("proposal fixes a different rate than requested".into()),
            None => Err("proposal has no output state".into()),
        }
    }
}
