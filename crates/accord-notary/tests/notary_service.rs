//! End-to-end notary tests: requester flows talking to a live notary
//! service over the in-memory network.

use accord_core::{
    ClockTimeWindowChecker, NotaryError, PartyName, TimeWindow, TimeWindowChecker,
    TransactionState, TransactionStore,
};
use accord_flow::FlowError;
use accord_notary::{
    notarise, notary_topic, InMemoryUniquenessProvider, NotaryResponse, NotaryService,
    SignRequest, UniquenessProvider,
};
use accord_testkit::{issuance_tx, move_tx, RejectingVerifier, TestNet, TestNode};
use assert_matches::assert_matches;
use ed25519_dalek::SigningKey;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

fn install_notary(node: &TestNode, validating: bool) -> Arc<InMemoryUniquenessProvider> {
    let provider = InMemoryUniquenessProvider::new();
    let service = NotaryService::new(
        Arc::clone(&provider) as Arc<dyn UniquenessProvider>,
        Arc::new(ClockTimeWindowChecker::default_tolerance()) as Arc<dyn TimeWindowChecker>,
        validating,
    );
    service.register(&node.manager);
    provider
}

fn spent_state(owner: &accord_core::Party, notary: &accord_core::Party) -> TransactionState {
    TransactionState {
        contract: "test".into(),
        payload: b"moved".to_vec(),
        participants: vec![owner.clone()],
        notary: notary.clone(),
    }
}

#[tokio::test]
async fn notarisation_happy_path() {
    let net = TestNet::new();
    let alice = net.add_node("Alice", 1);
    let notary = net.add_notary_node("Notary", 50);
    let provider = install_notary(&notary, false);

    let (producer, input) = issuance_tx("test", vec![alice.party.clone()], &notary.party).unwrap();
    alice.store.record(&[producer]).unwrap();
    let tx = move_tx(
        input,
        spent_state(&alice.party, &notary.party),
        vec![alice.party.signer_key()],
        &notary.party,
        None,
    )
    .with_key(&signing_key(1))
    .unwrap();

    let wire_bytes = tx.wire.wire_bytes().unwrap();
    let txid = tx.id().unwrap();
    let notary_key = notary.party.signer_key();
    let request = tx.clone();
    let handle = alice
        .manager
        .start("notarise", move |ctx| notarise(ctx, request));

    let sig = handle.result().await.unwrap();
    assert_eq!(sig.by, notary_key);
    sig.verify(&wire_bytes).unwrap();
    assert_eq!(provider.consumer_of(&input).unwrap().txid, txid);
}

#[tokio::test]
async fn double_spend_yields_verifiable_conflict_evidence() {
    let net = TestNet::new();
    let alice = net.add_node("Alice", 1);
    let bob = net.add_node("Bob", 2);
    let notary = net.add_notary_node("Notary", 50);
    install_notary(&notary, false);

    let participants = vec![alice.party.clone(), bob.party.clone()];
    let (producer, input) = issuance_tx("test", participants, &notary.party).unwrap();
    alice.store.record(std::slice::from_ref(&producer)).unwrap();
    bob.store.record(&[producer]).unwrap();

    let first = move_tx(
        input,
        spent_state(&alice.party, &notary.party),
        vec![],
        &notary.party,
        None,
    );
    let second = move_tx(
        input,
        spent_state(&bob.party, &notary.party),
        vec![],
        &notary.party,
        None,
    );
    let winner_id = first.id().unwrap();
    let loser_id = second.id().unwrap();

    alice
        .manager
        .start("spend", move |ctx| notarise(ctx, first))
        .result()
        .await
        .unwrap();
    let err = bob
        .manager
        .start("respend", move |ctx| notarise(ctx, second))
        .result()
        .await
        .unwrap_err();

    let evidence = match err {
        FlowError::Notary(NotaryError::Conflict(evidence)) => evidence,
        other => panic!("expected a conflict, got {other:?}"),
    };
    // The evidence is independently checkable against the notary's key and
    // names both the rejected transaction and the winning consumer.
    evidence.verify(&notary.party.key).unwrap();
    assert_eq!(evidence.conflict.rejected_txid, loser_id);
    assert_eq!(evidence.conflict.consumed[&input].txid, winner_id);
}

#[tokio::test]
async fn recommitting_the_same_transaction_succeeds() {
    let net = TestNet::new();
    let alice = net.add_node("Alice", 1);
    let notary = net.add_notary_node("Notary", 50);
    let provider = install_notary(&notary, false);

    let (producer, input) = issuance_tx("test", vec![alice.party.clone()], &notary.party).unwrap();
    alice.store.record(&[producer]).unwrap();
    let tx = move_tx(
        input,
        spent_state(&alice.party, &notary.party),
        vec![],
        &notary.party,
        None,
    );

    for attempt in 0..2 {
        let request = tx.clone();
        alice
            .manager
            .start(format!("notarise-{attempt}"), move |ctx| {
                notarise(ctx, request)
            })
            .result()
            .await
            .unwrap();
    }
    assert_eq!(provider.len(), 1);
}

#[tokio::test]
async fn concurrent_double_spend_has_exactly_one_winner() {
    let net = TestNet::new();
    let alice = net.add_node("Alice", 1);
    let bob = net.add_node("Bob", 2);
    let notary = net.add_notary_node("Notary", 50);
    install_notary(&notary, false);

    let participants = vec![alice.party.clone(), bob.party.clone()];
    let (producer, input) = issuance_tx("test", participants, &notary.party).unwrap();
    alice.store.record(std::slice::from_ref(&producer)).unwrap();
    bob.store.record(&[producer]).unwrap();

    let tx_a = move_tx(
        input,
        spent_state(&alice.party, &notary.party),
        vec![],
        &notary.party,
        None,
    );
    let tx_b = move_tx(
        input,
        spent_state(&bob.party, &notary.party),
        vec![],
        &notary.party,
        None,
    );

    let race_a = alice.manager.start("race-a", move |ctx| notarise(ctx, tx_a));
    let race_b = bob.manager.start("race-b", move |ctx| notarise(ctx, tx_b));
    let outcomes = [race_a.result().await, race_b.result().await];

    let winners = outcomes.iter().filter(|out| out.is_ok()).count();
    assert_eq!(winners, 1);
    let loss = outcomes.into_iter().find(Result::is_err);
    assert_matches!(
        loss,
        Some(Err(FlowError::Notary(NotaryError::Conflict(_))))
    );
}

#[tokio::test]
async fn expired_time_window_is_rejected() {
    let net = TestNet::new();
    let alice = net.add_node("Alice", 1);
    let notary = net.add_notary_node("Notary", 50);
    let provider = install_notary(&notary, false);

    let (producer, input) = issuance_tx("test", vec![alice.party.clone()], &notary.party).unwrap();
    alice.store.record(&[producer]).unwrap();
    let expired = TimeWindow::until(SystemTime::now() - Duration::from_secs(3600));
    let tx = move_tx(
        input,
        spent_state(&alice.party, &notary.party),
        vec![],
        &notary.party,
        Some(expired),
    );

    let err = alice
        .manager
        .start("late", move |ctx| notarise(ctx, tx))
        .result()
        .await
        .unwrap_err();
    assert_matches!(err, FlowError::Notary(NotaryError::TimestampInvalid));
    // The rejection happened before the commit step.
    assert!(provider.is_empty());
}

#[tokio::test]
async fn service_rejects_transaction_naming_another_notary() {
    let net = TestNet::new();
    let alice = net.add_node("Alice", 1);
    let bob = net.add_node("Bob", 2);
    let notary = net.add_notary_node("Notary", 50);
    install_notary(&notary, false);

    // A transaction declaring Bob as its notary, handed to the real notary
    // service directly.
    let (producer, input) = issuance_tx("test", vec![alice.party.clone()], &bob.party).unwrap();
    alice.store.record(&[producer]).unwrap();
    let tx = move_tx(
        input,
        spent_state(&alice.party, &bob.party),
        vec![],
        &bob.party,
        None,
    );

    let notary_party = notary.party.clone();
    let err = alice
        .manager
        .start("misdirected", move |ctx| async move {
            let mut session = ctx.initiate(&notary_party, &notary_topic()).await?;
            let request = SignRequest {
                tx,
                requester: ctx.me().name.clone(),
            };
            let response: NotaryResponse =
                session.send_and_receive(&request).await?.unwrap(Ok)?;
            match response {
                NotaryResponse::Signature(_) => Ok(()),
                NotaryResponse::Error(e) => Err(FlowError::Notary(e)),
            }
        })
        .result()
        .await
        .unwrap_err();
    assert_matches!(err, FlowError::Notary(NotaryError::TransactionInvalid(_)));
}

#[tokio::test]
async fn validating_notary_demands_required_signatures() {
    let net = TestNet::new();
    let alice = net.add_node("Alice", 1);
    let notary = net.add_notary_node("Notary", 50);
    install_notary(&notary, true);

    let (producer, input) = issuance_tx("test", vec![alice.party.clone()], &notary.party).unwrap();
    net.seed_history(&producer).unwrap();
    alice.store.record(&[producer]).unwrap();

    // Demands Alice's signature but carries none.
    let tx = move_tx(
        input,
        spent_state(&alice.party, &notary.party),
        vec![alice.party.signer_key()],
        &notary.party,
        None,
    );

    let err = alice
        .manager
        .start("unsigned", move |ctx| notarise(ctx, tx))
        .result()
        .await
        .unwrap_err();
    let missing = match err {
        FlowError::Notary(NotaryError::SignaturesMissing(missing)) => missing,
        other => panic!("expected missing signatures, got {other:?}"),
    };
    assert_eq!(missing, vec![alice.party.signer_key()]);
}

#[tokio::test]
async fn validating_notary_rejects_contract_invalid_transaction() {
    let net = TestNet::new();
    let alice = net.add_node("Alice", 1);
    let notary = net.add_node_with_verifier(
        "Notary",
        50,
        Arc::new(RejectingVerifier("contract rejected".into())),
    );
    let provider = install_notary(&notary, true);

    let (producer, input) = issuance_tx("test", vec![alice.party.clone()], &notary.party).unwrap();
    net.seed_history(&producer).unwrap();
    alice.store.record(&[producer]).unwrap();
    let tx = move_tx(
        input,
        spent_state(&alice.party, &notary.party),
        vec![alice.party.signer_key()],
        &notary.party,
        None,
    )
    .with_key(&signing_key(1))
    .unwrap();

    let err = alice
        .manager
        .start("invalid", move |ctx| notarise(ctx, tx))
        .result()
        .await
        .unwrap_err();
    assert_matches!(
        err,
        FlowError::Notary(NotaryError::TransactionInvalid(reason)) if reason.contains("contract rejected")
    );
    assert!(provider.is_empty());
}

#[tokio::test]
async fn commit_is_attributed_to_the_session_peer_not_the_claimed_name() {
    let net = TestNet::new();
    let alice = net.add_node("Alice", 1);
    let notary = net.add_notary_node("Notary", 50);
    let provider = install_notary(&notary, false);

    let (producer, input) = issuance_tx("test", vec![alice.party.clone()], &notary.party).unwrap();
    alice.store.record(&[producer]).unwrap();
    let tx = move_tx(
        input,
        spent_state(&alice.party, &notary.party),
        vec![],
        &notary.party,
        None,
    );

    // Alice claims to be someone else; the ledger must record the session
    // peer regardless.
    let notary_party = notary.party.clone();
    alice
        .manager
        .start("spoofed", move |ctx| async move {
            let mut session = ctx.initiate(&notary_party, &notary_topic()).await?;
            let request = SignRequest {
                tx,
                requester: PartyName::new("Mallory"),
            };
            let response: NotaryResponse =
                session.send_and_receive(&request).await?.unwrap(Ok)?;
            match response {
                NotaryResponse::Signature(_) => Ok(()),
                NotaryResponse::Error(e) => Err(FlowError::Notary(e)),
            }
        })
        .result()
        .await
        .unwrap();

    let record = provider.consumer_of(&input).unwrap();
    assert_eq!(record.requester, alice.party.name);
}

#[tokio::test]
async fn client_refuses_mixed_notary_inputs() {
    let net = TestNet::new();
    let alice = net.add_node("Alice", 1);
    let notary = net.add_notary_node("Notary", 50);
    let other_notary = net.add_notary_node("OtherNotary", 51);
    install_notary(&notary, false);

    // The input state is controlled by the other notary; the client must
    // refuse to send the request at all.
    let (producer, input) =
        issuance_tx("test", vec![alice.party.clone()], &other_notary.party).unwrap();
    alice.store.record(&[producer]).unwrap();
    let tx = move_tx(
        input,
        spent_state(&alice.party, &notary.party),
        vec![],
        &notary.party,
        None,
    );

    let err = alice
        .manager
        .start("mixed", move |ctx| notarise(ctx, tx))
        .result()
        .await
        .unwrap_err();
    assert_matches!(err, FlowError::Core(_));
}
