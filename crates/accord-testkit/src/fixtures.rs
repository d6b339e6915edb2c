//! Transaction builders for tests.

use accord_core::{
    Command, Party, Result, SignedTransaction, SignerKey, StateRef, TimeWindow,
    TransactionState, WireTransaction,
};

/// An issuance: no inputs, one output state owned by `participants`.
///
/// Returns the unsigned transaction and a reference to its single output.
pub fn issuance_tx(
    contract: &str,
    participants: Vec<Party>,
    notary: &Party,
) -> Result<(SignedTransaction, StateRef)> {
    let wire = WireTransaction {
        inputs: vec![],
        outputs: vec![TransactionState {
            contract: contract.to_owned(),
            payload: b"issued".to_vec(),
            participants,
            notary: notary.clone(),
        }],
        commands: vec![],
        notary: Some(notary.clone()),
        time_window: None,
    };
    let state_ref = wire.out_ref(0)?;
    Ok((SignedTransaction::unsigned(wire), state_ref))
}

/// A move: consumes `input`, emits one output, demands a signature from
/// every signer key given.
pub fn move_tx(
    input: StateRef,
    output: TransactionState,
    signers: Vec<SignerKey>,
    notary: &Party,
    time_window: Option<TimeWindow>,
) -> SignedTransaction {
    SignedTransaction::unsigned(WireTransaction {
        inputs: vec![input],
        outputs: vec![output],
        commands: vec![Command {
            name: "Move".into(),
            signers,
        }],
        notary: Some(notary.clone()),
        time_window,
    })
}
