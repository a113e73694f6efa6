// Run with `RUST_LOG=info cargo run --example basic`

use tpsi_ad::{
    Client, ClientId, DirectoryStore, Fingerprint, MatchOutcome, ProtocolParams, Server,
    StorageConfig, ThresholdOutcome,
};

fn main() -> tpsi_ad::Result<()> {
    pretty_env_logger::init();
    let mut csprng = rand_core::OsRng;

    // Params
    let t = 1; // threshold: more than t matches release the data
    let params = ProtocolParams::with_threshold(t);
    let known = ["deadbeef", "cafebabe", "0badf00d"];

    println!("\nGLOBAL PARAMETERS");
    println!("-----------------");
    println!("curve: {}", params.curve);
    println!("threshold: {t}");
    println!("expansion factor: {}", params.expansion_factor);

    println!("\nWORKFLOW");
    println!("--------");
    println!("[Server side]");
    println!("\tSetting up over {} known fingerprints...", known.len());
    let server = Server::setup(params.clone(), known.map(Fingerprint::from), &mut csprng)?;
    let report = server.setup_report();
    println!(
        "\t{} slots, hash pair {}, {} dropped",
        report.slots,
        report.hash_pair,
        report.dropped.len()
    );

    let alice = ClientId::new("alice")?;
    server.register_client(alice.clone());
    println!("\tRegistered client {alice}");

    println!("[Client side]");
    println!("\tReceived a public table of {} points", server.public_table().points().len());
    let client = Client::generate(alice.clone(), server.public_table().clone(), &params, &mut csprng)?;

    let items = [
        ("deadbeef", b"payload A".to_vec()),
        ("feedface", b"payload C".to_vec()),
        ("deadbeef", b"payload B".to_vec()),
    ];
    let vouchers: Vec<_> = items
        .into_iter()
        .map(|(fingerprint, data)| {
            let id = server.next_item_id();
            println!("\tGenerating voucher {id} for fingerprint {fingerprint}...");
            client.submit(id, fingerprint, data, &mut csprng)
        })
        .collect();

    println!("[Server side]");
    for voucher in &vouchers {
        let outcome = match server.open_voucher(voucher) {
            MatchOutcome::Matched(_) => "match",
            MatchOutcome::NoMatch => "no match",
            MatchOutcome::Ambiguous => "ambiguous",
            MatchOutcome::InnerRejected => "rejected",
        };
        println!("\tVoucher {}: {outcome}", voucher.id);
    }

    println!("\tProcessing only the first voucher...");
    let report = server.process_batch(&alice, &vouchers[..1])?;
    if let ThresholdOutcome::Insufficient {
        distinct_shares, ..
    } = report.outcome
    {
        println!("\t{distinct_shares} share(s), threshold not reached, nothing decrypted");
    }

    println!("\tProcessing the rest...");
    let report = server.process_batch(&alice, &vouchers[1..])?;
    for item in report.outcome.recovered() {
        println!(
            "\tRecovered item {}: {:?}",
            item.id,
            String::from_utf8_lossy(&item.data)
        );
    }

    let dir = std::env::temp_dir().join("tpsi-ad-basic");
    let store = DirectoryStore::new(StorageConfig::new(&dir));
    let stored = report.outcome.persist(&alice, &store)?;
    println!("\tStored {stored} item(s) under {}", store.client_dir(&alice).display());

    Ok(())
}
