use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use tpsi_ad::{Client, ClientId, Fingerprint, ItemId, ProtocolParams, Server, Voucher};

fn setup(known: usize) -> (Server, Client) {
    let mut csprng = rand_core::OsRng;
    let params = ProtocolParams::default();
    let server = Server::setup(
        params.clone(),
        (0..known).map(|i| Fingerprint::new(format!("{i:032x}"))),
        &mut csprng,
    )
    .unwrap();

    let id = ClientId::new("bench").unwrap();
    server.register_client(id.clone());
    let client = Client::generate(id, server.public_table().clone(), &params, &mut csprng).unwrap();

    (server, client)
}

fn benchmark_setup(c: &mut Criterion) {
    let mut csprng = rand_core::OsRng;
    let known: Vec<Fingerprint> = (0..1000)
        .map(|i| Fingerprint::new(format!("{i:032x}")))
        .collect();

    c.bench_function("setup 1000", |b| {
        b.iter(|| Server::setup(ProtocolParams::default(), known.iter().cloned(), &mut csprng))
    });
}

fn benchmark_generate_voucher(c: &mut Criterion) {
    let mut csprng = rand_core::OsRng;
    let (_server, client) = setup(1000);

    c.bench_function("generate voucher", |b| {
        b.iter(|| client.submit(ItemId(0), format!("{:032x}", 7), vec![0u8; 64], &mut csprng))
    });
}

fn benchmark_open_voucher(c: &mut Criterion) {
    let mut csprng = rand_core::OsRng;
    let (server, client) = setup(1000);
    let voucher = client.submit(ItemId(0), format!("{:032x}", 7), vec![0u8; 64], &mut csprng);

    c.bench_function("open voucher", |b| b.iter(|| server.open_voucher(&voucher)));
}

fn benchmark_process_batch(c: &mut Criterion) {
    let mut csprng = rand_core::OsRng;

    c.bench_function("process batch of 16", |b| {
        b.iter_batched(
            || {
                let (server, client) = setup(100);
                let vouchers: Vec<Voucher> = (0..16)
                    .map(|i| {
                        let fingerprint = format!("{:032x}", i * 5);
                        client.submit(ItemId(i), fingerprint, vec![0u8; 64], &mut csprng)
                    })
                    .collect();
                (server, client, vouchers)
            },
            |(server, client, vouchers)| server.process_batch(client.id(), &vouchers),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    benches,
    benchmark_setup,
    benchmark_generate_voucher,
    benchmark_open_voucher,
    benchmark_process_batch
);
criterion_main!(benches);
