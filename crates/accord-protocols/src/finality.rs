//! Finality: notarise a transaction and broadcast it to its participants.
//!
//! The sender obtains the notary signature (if the transaction names a
//! notary and is not yet signed by it), records locally, then sends the
//! fully-signed transaction to every other participant. Each recipient
//! independently verifies the signature set before recording; it never
//! trusts the sender's say-so that the transaction is done.

use crate::messages::FinalSignatureSet;
use accord_core::{AccordError, Party, SignedTransaction};
use accord_flow::{FlowCtx, FlowError, FlowManager, FlowResult, ServiceHandle, Topic};
use accord_notary::notarise;
use tracing::{debug, info};

/// Topic of the finality broadcast.
pub const FINALITY_TOPIC: &str = "platform.finality";

/// The finality topic as a [`Topic`] value
pub fn finality_topic() -> Topic {
    Topic::new(FINALITY_TOPIC)
}

/// Notarise `tx` if needed, record it, and broadcast it to every
/// participant of its output states other than ourselves.
pub async fn finalise(ctx: FlowCtx, tx: SignedTransaction) -> FlowResult<SignedTransaction> {
    let mut stx = tx;
    ctx.progress().set_step("Verifying signatures");
    let notary_key = stx.wire.notary.as_ref().map(|n| n.signer_key());
    let allowed_missing: Vec<_> = notary_key.into_iter().collect();
    stx.verify_signatures(&allowed_missing)?;

    if let Some(notary_key) = notary_key {
        if !stx.is_signed_by(&notary_key) {
            ctx.progress().set_step("Notarising");
            let for_notary = stx.clone();
            let notary_sig = ctx
                .subflow("Requesting notary signature", |sub| {
                    notarise(sub, for_notary)
                })
                .await?;
            stx = stx.with_signature(notary_sig)?;
        }
    }

    ctx.progress().set_step("Recording");
    ctx.hub().tx_store.record(std::slice::from_ref(&stx))?;

    ctx.progress().set_step("Broadcasting");
    let me = ctx.me().clone();
    let mut recipients: Vec<Party> = Vec::new();
    for participant in stx
        .wire
        .outputs
        .iter()
        .flat_map(|output| output.participants.iter())
    {
        if *participant != me && !recipients.contains(participant) {
            recipients.push(participant.clone());
        }
    }
    for recipient in &recipients {
        let session = ctx.initiate(recipient, &finality_topic()).await?;
        session.send(&FinalSignatureSet { tx: stx.clone() }).await?;
        debug!(to = %recipient, "final transaction sent");
    }

    info!(tx = %stx.id()?, recipients = recipients.len(), "finalised");
    Ok(stx)
}

/// Register the recipient side: verify the broadcast transaction's
/// signature set and record it.
pub fn register_finality_recipient(manager: &FlowManager) -> ServiceHandle {
    manager.register_service(finality_topic(), |ctx, handshake| async move {
        let mut session = ctx.accept(&finality_topic(), &handshake);
        ctx.progress().set_step("Awaiting final transaction");
        let tx = session
            .receive::<FinalSignatureSet>()
            .await?
            .unwrap(|set| {
                let tx = set.tx;
                tx.verify_signatures(&[])?;
                if let Some(notary) = &tx.wire.notary {
                    if !tx.is_signed_by(&notary.signer_key()) {
                        return Err(AccordError::crypto("notary signature missing"));
                    }
                }
                Ok(tx)
            })
            .map_err(|e| FlowError::violation(e.to_string()))?;
        ctx.hub().tx_store.record(std::slice::from_ref(&tx))?;
        ctx.progress().set_step("Recorded");
        Ok(())
    })
}
