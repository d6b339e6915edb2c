//! Two-party deal: a Primary/Secondary agreement pattern.
//!
//! The Primary opens the session and sends the deal request; the Secondary
//! either refuses it (policy gate) or replies with a partially-signed
//! proposal transaction. The Primary verifies the proposal, signs,
//! notarises, records, and returns the final signature set; the Secondary
//! re-verifies it independently before recording its own copy.

use crate::messages::FinalSignatureSet;
use accord_core::{
    AccordError, Party, PartyName, SignedTransaction, TransactionSignature, TxId,
};
use accord_flow::{FlowCtx, FlowError, FlowManager, FlowResult, Handshake, ServiceHandle, Topic};
use accord_notary::notarise;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// What a concrete deal protocol supplies.
#[async_trait]
pub trait Deal: Send + Sync + 'static {
    /// Content of the Primary's opening request
    type Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Topic this deal's sessions run on
    fn topic(&self) -> Topic;

    /// Secondary-side policy gate, run before anything is assembled. An
    /// `Err` is sent back as the refusal reason (e.g. the request's declared
    /// deadline has passed).
    fn check_request(&self, payload: &Self::Payload) -> Result<(), String>;

    /// Secondary builds the proposed transaction from the request.
    fn assemble_tx(
        &self,
        ctx: &FlowCtx,
        payload: &Self::Payload,
        primary: &Party,
    ) -> FlowResult<SignedTransaction>;

    /// Primary checks the proposal is the deal it asked for.
    fn check_proposal(
        &self,
        ctx: &FlowCtx,
        payload: &Self::Payload,
        tx: &SignedTransaction,
    ) -> Result<(), String>;
}

/// Opening message of a deal session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealRequest<P> {
    /// Deal-specific request content
    pub payload: P,
}

/// The Secondary's reply to a deal request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DealResponse {
    /// A partially-signed proposal transaction
    Proposal(SignedTransaction),
    /// The request was refused (policy, deadline, mismatch)
    Refused(String),
}

/// Terminal outcome of the Primary role.
#[derive(Debug)]
pub enum DealResult {
    /// Both sides hold the fully-signed, notarised transaction
    Completed(SignedTransaction),
    /// The Secondary refused the request
    Refused {
        /// Who refused
        by: PartyName,
        /// Their stated reason
        reason: String,
    },
}

/// Run the Primary role against `counterparty`.
pub async fn instigate_deal<D: Deal>(
    ctx: FlowCtx,
    deal: Arc<D>,
    counterparty: Party,
    payload: D::Payload,
) -> FlowResult<DealResult> {
    let hub = ctx.hub();
    ctx.progress().set_step("Requesting proposal");
    let mut session = ctx.initiate(&counterparty, &deal.topic()).await?;
    let response = session
        .send_and_receive::<_, DealResponse>(&DealRequest {
            payload: payload.clone(),
        })
        .await?
        .unwrap(|response| {
            if let DealResponse::Proposal(tx) = &response {
                tx.id()?;
            }
            Ok(response)
        })?;

    let proposed = match response {
        DealResponse::Refused(reason) => {
            info!(by = %counterparty, reason = %reason, "deal refused");
            return Ok(DealResult::Refused {
                by: counterparty.name,
                reason,
            });
        }
        DealResponse::Proposal(tx) => tx,
    };

    ctx.progress().set_step("Verifying proposal");
    let deps: Vec<TxId> = proposed.wire.inputs.iter().map(|input| input.txid).collect();
    hub.resolver.fetch_missing(&deps, &counterparty).await?;

    let bytes = proposed.wire.wire_bytes()?;
    for (by, signature) in &proposed.sigs {
        TransactionSignature {
            by: *by,
            signature: *signature,
        }
        .verify(&bytes)
        .map_err(|e| FlowError::violation(e.to_string()))?;
    }
    if !proposed.is_signed_by(&counterparty.signer_key()) {
        return Err(FlowError::violation("proposal not signed by the secondary"));
    }
    deal.check_proposal(&ctx, &payload, &proposed)
        .map_err(FlowError::ProtocolViolation)?;
    hub.verifier.verify(&proposed, hub.tx_store.as_ref())?;

    ctx.progress().set_step("Signing");
    let mut stx = proposed.with_key(hub.identity.signing_key())?;

    if stx.wire.notary.is_some() {
        ctx.progress().set_step("Notarising");
        let for_notary = stx.clone();
        let notary_sig = ctx
            .subflow("Requesting notary signature", |sub| {
                notarise(sub, for_notary)
            })
            .await?;
        stx = stx.with_signature(notary_sig)?;
    }

    ctx.progress().set_step("Recording");
    hub.tx_store.record(std::slice::from_ref(&stx))?;

    ctx.progress().set_step("Sending signatures");
    session.send(&FinalSignatureSet { tx: stx.clone() }).await?;
    info!(tx = %stx.id()?, with = %counterparty, "deal completed");
    Ok(DealResult::Completed(stx))
}

/// Register the Secondary role as a service.
pub fn register_deal_responder<D: Deal>(manager: &FlowManager, deal: Arc<D>) -> ServiceHandle {
    let topic = deal.topic();
    manager.register_service(topic, move |ctx, handshake| {
        let deal = Arc::clone(&deal);
        async move { respond(ctx, deal, handshake).await }
    })
}

async fn respond<D: Deal>(ctx: FlowCtx, deal: Arc<D>, handshake: Handshake) -> FlowResult<()> {
    let mut session = ctx.accept(&deal.topic(), &handshake);
    ctx.progress().set_step("Awaiting request");
    // The policy gate is the validation: the request leaves the wrapper
    // together with the verdict on its payload, never before it.
    let (request, verdict) = session
        .receive::<DealRequest<D::Payload>>()
        .await?
        .unwrap(|req| {
            let verdict = deal.check_request(&req.payload);
            Ok((req, verdict))
        })?;

    if let Err(reason) = verdict {
        debug!(reason = %reason, "refusing deal request");
        session.send(&DealResponse::Refused(reason)).await?;
        ctx.progress().set_step("Refused");
        return Ok(());
    }

    ctx.progress().set_step("Proposing");
    let primary = session.peer().clone();
    let stx = match deal
        .assemble_tx(&ctx, &request.payload, &primary)
        .and_then(|tx| Ok(tx.with_key(ctx.hub().identity.signing_key())?))
    {
        Ok(stx) => stx,
        Err(e) => {
            // Internal failure stays internal; the wire carries a reason.
            session.send(&DealResponse::Refused(e.to_string())).await?;
            ctx.progress().set_step("Refused");
            return Ok(());
        }
    };
    session.send(&DealResponse::Proposal(stx.clone())).await?;

    ctx.progress().set_step("Awaiting final signatures");
    let expected_id = stx.id()?;
    let own_key = ctx.me().signer_key();
    let notary_key = stx.wire.notary.as_ref().map(|n| n.signer_key());
    let final_tx = session
        .receive::<FinalSignatureSet>()
        .await?
        .unwrap(|set| {
            let tx = set.tx;
            if tx.id()? != expected_id {
                return Err(AccordError::invalid(
                    "final transaction differs from the proposal",
                ));
            }
            tx.verify_signatures(&[])?;
            if let Some(notary_key) = notary_key {
                if !tx.is_signed_by(&notary_key) {
                    return Err(AccordError::crypto("notary signature missing"));
                }
            }
            if !tx.is_signed_by(&own_key) {
                return Err(AccordError::crypto("own signature missing from final set"));
            }
            Ok(tx)
        })
        .map_err(|e| FlowError::violation(e.to_string()))?;

    ctx.hub().tx_store.record(std::slice::from_ref(&final_tx))?;
    ctx.progress().set_step("Recorded");
    Ok(())
}
