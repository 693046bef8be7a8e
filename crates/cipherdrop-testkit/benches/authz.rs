//! Authorization hot paths: grant checks, value sealing and a cached decrypt.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

use cipherdrop::AuthorizerConfig;
use cipherdrop_authz::{
    authorization_message, DecryptionGrant, SealedValue, X25519StaticSecret,
};
use cipherdrop_core::{CiphertextCodec, CiphertextHandle, FheType, Keypair, StorageLocation};
use cipherdrop_testkit::TestFixture;

fn grant_verify(c: &mut Criterion) {
    let alice = Keypair::from_seed(&[1; 32]);
    let location = StorageLocation::from_bytes([0x10; 20]);
    let handle = CiphertextHandle::from_bytes([0xa1; 32]);
    let session = X25519StaticSecret::from_bytes([7; 32]).public_key();

    let message =
        authorization_message(&alice.identity(), &location, &handle, &session, 0, 1_000)
            .expect("message");
    let grant = DecryptionGrant {
        identity: alice.identity(),
        storage_location: location,
        handle,
        session_public_key: session,
        signature: alice.sign(&message),
        issued_at: 0,
        expires_at: 1_000,
    };

    c.bench_function("grant_message", |b| b.iter(|| black_box(&grant).message()));
    c.bench_function("grant_verify", |b| b.iter(|| black_box(&grant).verify()));
}

fn seal_open(c: &mut Criterion) {
    let secret = X25519StaticSecret::from_bytes([7; 32]);
    let recipient = secret.public_key();
    let context = [0xa1u8; 32];
    let sealed = SealedValue::seal(42, &recipient, &context).expect("seal");

    c.bench_function("sealed_value_seal", |b| {
        b.iter(|| SealedValue::seal(black_box(42), &recipient, &context))
    });
    c.bench_function("sealed_value_open", |b| {
        b.iter(|| black_box(&sealed).open(&secret, &context))
    });
}

fn proof_and_cached_decrypt(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let fixture = TestFixture::new();
    let (handle, _) = rt.block_on(fixture.register(0, 1)).expect("register");
    let alice = fixture.identity(0);

    let proof = rt
        .block_on(
            fixture
                .coprocessor
                .encode(5, FheType::Uint32, &fixture.location, &alice),
        )
        .expect("encode");
    c.bench_function("registry_verify_proof", |b| {
        b.iter(|| {
            fixture
                .registry
                .verify_proof(&alice, &proof.handle, black_box(&proof.proof))
        })
    });

    let authorizer = fixture.authorizer(Arc::new(fixture.signer()), AuthorizerConfig::default());
    rt.block_on(authorizer.decrypt(&alice, &fixture.location, &handle))
        .expect("warm cache");
    c.bench_function("authorizer_cached_decrypt", |b| {
        b.iter(|| rt.block_on(authorizer.decrypt(&alice, &fixture.location, &handle)))
    });
}

criterion_group!(benches, grant_verify, seal_open, proof_and_cached_decrypt);
criterion_main!(benches);
