//! Proptest strategies over the policy data model.

use proptest::prelude::*;

use mailseal_core::{AttributeRequest, Conjunction, Policy, PolicyBuilder};

/// An arbitrary non-email attribute request.
pub fn attribute() -> impl Strategy<Value = AttributeRequest> {
    (
        "attr\\.[a-z]{1,10}",
        proptest::option::of("[a-zA-Z0-9 ]{0,16}"),
    )
        .prop_map(|(atype, value)| AttributeRequest { atype, value })
}

/// An arbitrary conjunction of 1..=max attributes.
pub fn conjunction(max: usize) -> impl Strategy<Value = Conjunction> {
    proptest::collection::vec(attribute(), 1..=max).prop_map(Conjunction)
}

/// An arbitrary lower-case email address.
pub fn email() -> impl Strategy<Value = String> {
    "[a-z]{1,8}@[a-z]{1,8}\\.example".prop_map(|s| s)
}

/// A default-conjunction policy over 1..=max distinct recipients.
pub fn policy(max: usize, timestamp: i64) -> impl Strategy<Value = Policy> {
    proptest::collection::btree_set(email(), 1..=max).prop_map(move |recipients| {
        PolicyBuilder::new(timestamp)
            .build(recipients.iter())
            .expect("default policy never has empty conjunctions")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{mock_decryption_key, MockEngine, MASTER_PREFIX, VERIFICATION_PREFIX};
    use bytes::Bytes;
    use mailseal_core::{chunk, chunk_channel};
    use mailseal_pipeline::{
        DecryptionKey, MasterPublicKey, SealEngine, SealOptions, SigningKeys, VerificationKey,
    };

    const SEED: &str = "generator-seed";

    /// Seal then unseal an arbitrary policy and payload; the recovered
    /// bytes must be identical for every recipient.
    fn roundtrip(policy: Policy, payload: Vec<u8>) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");

        rt.block_on(async move {
            let engine = MockEngine::new();
            let master = MasterPublicKey(format!("{MASTER_PREFIX}{SEED}"));
            let vk = VerificationKey(format!("{VERIFICATION_PREFIX}{SEED}"));

            let public = Conjunction(vec![AttributeRequest::email("sender@x.example")]);
            let signing = SigningKeys {
                public: serde_json::to_string(&public).unwrap(),
                private: None,
            };

            let (pt_tx, pt_rx) = chunk_channel();
            let (ct_tx, mut ct_rx) = chunk_channel();
            let data = Bytes::from(payload.clone());
            tokio::spawn(async move {
                chunk::send_split(&pt_tx, data, 128).await;
            });
            let collector = tokio::spawn(async move { chunk::collect(&mut ct_rx).await });

            engine
                .seal(
                    &master,
                    SealOptions {
                        policy: policy.clone(),
                        signing,
                    },
                    pt_rx,
                    ct_tx,
                )
                .await
                .unwrap();
            let ciphertext = collector.await.unwrap();

            for (recipient, entry) in policy.iter() {
                let (tx, rx) = chunk_channel();
                let ct = ciphertext.clone();
                tokio::spawn(async move {
                    chunk::send_split(&tx, ct, 256).await;
                });
                let unsealer = engine.open(&vk, rx).await.unwrap();

                let usk = mock_decryption_key(
                    SEED,
                    &entry.conjunction.canonical_hash(),
                    entry.timestamp,
                );
                let (out_tx, mut out_rx) = chunk_channel();
                let collect = tokio::spawn(async move { chunk::collect(&mut out_rx).await });
                unsealer
                    .unseal(recipient, &DecryptionKey(usk), out_tx)
                    .await
                    .unwrap();
                assert_eq!(&collect.await.unwrap()[..], &payload[..]);
            }
        });
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn roundtrip_recovers_payload_for_every_recipient(
            policy in policy(3, 1736870400),
            payload in proptest::collection::vec(any::<u8>(), 1..512),
        ) {
            roundtrip(policy, payload);
        }
    }
}
