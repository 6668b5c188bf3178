//! Performance benchmarks for the data-plane crypt pipeline.
//!
//! Run with: `cargo bench -p wraith-core`

use std::sync::{Arc, Mutex};

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use wraith_core::config::DeviceConfig;
use wraith_core::crypt::{CryptBatch, CryptItem, CryptPipeline, Deliver, Direction, RequestHandshake, Transmit};
use wraith_core::keypair::Keypair;
use wraith_core::peer::Peer;
use wraith_crypto::SessionKeys;

fn keys() -> SessionKeys {
    SessionKeys { send_key: [1; 32], recv_key: [2; 32], chain_key: [3; 32] }
}

fn bench_keypair_encrypt(c: &mut Criterion) {
    let mut group = c.benchmark_group("keypair_encrypt");
    let sizes = [64, 1024, 16384];

    for size in sizes {
        let kp = Keypair::from_keys(&keys(), 1, 2, true);
        let plaintext = vec![0xAAu8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            let mut counter = 0u64;
            b.iter(|| {
                let ct = kp.encrypt(black_box(counter), black_box(&plaintext)).unwrap();
                counter += 1;
                ct
            })
        });
    }

    group.finish();
}

fn bench_keypair_decrypt(c: &mut Criterion) {
    let mut group = c.benchmark_group("keypair_decrypt");
    let sizes = [64, 1024, 16384];

    for size in sizes {
        let send = Keypair::from_keys(&keys(), 1, 2, true);
        let recv = Keypair::from_keys(&keys(), 2, 1, false);
        let plaintext = vec![0xAAu8; size];
        let ciphertexts: Vec<Vec<u8>> =
            (0..64).map(|i| send.encrypt(i, &plaintext).unwrap()).collect();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            let mut counter = 0u64;
            b.iter(|| {
                let idx = (counter % ciphertexts.len() as u64) as usize;
                let pt = recv.decrypt(black_box(counter), black_box(&ciphertexts[idx]));
                counter += 1;
                let _ = pt;
            })
        });
    }

    group.finish();
}

struct NullSink;
impl Transmit for NullSink {
    fn transmit(&self, _peer: &Peer, _datagram: &[u8]) {}
}
impl Deliver for NullSink {
    fn deliver(&self, _peer: &Peer, _datagram: &[u8]) {}
}
struct NoRekey;
impl RequestHandshake for NoRekey {
    fn request_handshake(&self, _peer: &Arc<Peer>, _is_retry: bool) {}
}

fn bench_pipeline_throughput(c: &mut Criterion) {
    let sink = Arc::new(NullSink);
    let config = Arc::new(DeviceConfig::default());
    let pipeline = CryptPipeline::new(config, sink.clone(), sink.clone(), Arc::new(NoRekey));
    let peer = Arc::new(Peer::new(1, [0u8; 32]));
    let keypair = Arc::new(Keypair::from_keys(&keys(), 1, 2, true));
    let counter = Mutex::new(0u64);

    c.bench_function("pipeline_submit_encrypt_batch_of_8", |b| {
        b.iter(|| {
            let mut n = counter.lock().unwrap();
            let items: Vec<CryptItem> = (0..8)
                .map(|i| CryptItem { counter: *n + i, data: vec![0xAAu8; 512] })
                .collect();
            *n += 8;
            let batch = CryptBatch::new(peer.clone(), keypair.clone(), Direction::Encrypt, items);
            pipeline.submit_encrypt(batch);
        })
    });
}

criterion_group!(keypair_benches, bench_keypair_encrypt, bench_keypair_decrypt);
criterion_group!(pipeline_benches, bench_pipeline_throughput);

criterion_main!(keypair_benches, pipeline_benches);
