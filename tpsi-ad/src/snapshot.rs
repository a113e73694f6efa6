//! Versioned JSON snapshots of server and client state.
//!
//! Loading re-checks every invariant of the restored state and fails closed.

use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use curve25519_dalek::Scalar;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::client::{Client, ClientSecrets};
use crate::cuckoo::CuckooTable;
use crate::params::ProtocolParams;
use crate::server::{ClientLedger, Server};
use crate::setup::{verify_consistency, PublicTable, SetupReport, SetupState};
use crate::{ClientId, Error, Fingerprint, Result};

/// Version written by this crate. Older versions are read, newer rejected.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct ServerSnapshotRef<'a> {
    version: u32,
    known: &'a [Fingerprint],
    table: &'a CuckooTable,
    alpha: &'a Scalar,
    public: &'a PublicTable,
    report: &'a SetupReport,
    next_item_id: u64,
    clients: BTreeMap<ClientId, ClientLedger>,
}

#[derive(Deserialize)]
struct ServerSnapshot {
    known: Vec<Fingerprint>,
    table: CuckooTable,
    alpha: Scalar,
    public: PublicTable,
    report: SetupReport,
    next_item_id: u64,
    clients: BTreeMap<ClientId, ClientLedger>,
}

#[derive(Serialize)]
struct ClientSnapshotRef<'a> {
    version: u32,
    id: &'a ClientId,
    secrets: &'a ClientSecrets,
    table: &'a PublicTable,
}

#[derive(Deserialize)]
struct ClientSnapshot {
    id: ClientId,
    secrets: ClientSecrets,
    table: PublicTable,
}

fn read_versioned<R: Read, T: DeserializeOwned>(reader: R) -> Result<T> {
    let value: serde_json::Value = serde_json::from_reader(reader)?;

    let version = value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| Error::CorruptSnapshot("missing version".into()))?;
    let version = u32::try_from(version).unwrap_or(u32::MAX);
    if version > SNAPSHOT_VERSION {
        return Err(Error::UnsupportedSnapshotVersion(version));
    }
    if version == 0 {
        return Err(Error::CorruptSnapshot("version 0".into()));
    }

    Ok(serde_json::from_value(value)?)
}

impl Server {
    /// Writes setup state, roster and every client ledger.
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        let clients = self
            .roster
            .read()
            .iter()
            .map(|(id, ledger)| (id.clone(), ledger.lock().clone()))
            .collect();

        let snapshot = ServerSnapshotRef {
            version: SNAPSHOT_VERSION,
            known: &self.setup.known,
            table: &self.setup.table,
            alpha: &self.setup.alpha,
            public: &self.setup.public,
            report: &self.setup.report,
            next_item_id: self.next_item_id.load(Ordering::Relaxed),
            clients,
        };
        serde_json::to_writer(writer, &snapshot)?;

        Ok(())
    }

    pub fn load<R: Read>(reader: R) -> Result<Server> {
        let snapshot: ServerSnapshot = read_versioned(reader)?;
        let params = snapshot.public.params().clone();

        verify_consistency(
            &params,
            &snapshot.known,
            &snapshot.table,
            &snapshot.alpha,
            &snapshot.public,
        )?;
        check_membership(&params, &snapshot.known, &snapshot.table, &snapshot.public)?;
        check_report(&snapshot.report, &snapshot.known, &snapshot.table)?;
        for (id, ledger) in &snapshot.clients {
            if let Some(entry) = ledger
                .pending
                .iter()
                .find(|entry| !ledger.processed.contains(&entry.id))
            {
                return Err(Error::CorruptSnapshot(format!(
                    "client {id} holds unprocessed item {}",
                    entry.id
                )));
            }
        }

        let clients = snapshot.clients.len();
        let roster = snapshot
            .clients
            .into_iter()
            .map(|(id, ledger)| (id, Arc::new(Mutex::new(ledger))))
            .collect();

        log::info!(
            "restored server with {} slots and {} clients",
            snapshot.public.slots(),
            clients
        );

        Ok(Server {
            setup: SetupState {
                known: snapshot.known,
                table: snapshot.table,
                alpha: snapshot.alpha,
                public: snapshot.public,
                report: snapshot.report,
            },
            roster: RwLock::new(roster),
            next_item_id: AtomicU64::new(snapshot.next_item_id),
        })
    }
}

/// The known set is duplicate free and every member is either placed in one of
/// its candidate slots or recorded as dropped.
fn check_membership(
    params: &ProtocolParams,
    known: &[Fingerprint],
    table: &CuckooTable,
    public: &PublicTable,
) -> Result<()> {
    let members: HashSet<&Fingerprint> = known.iter().collect();
    if members.len() != known.len() {
        return Err(Error::CorruptSnapshot("duplicate known fingerprint".into()));
    }
    if table.indexing_key() != params.indexing_key.as_slice() {
        return Err(Error::CorruptSnapshot(
            "cuckoo table uses a different indexing key".into(),
        ));
    }

    for (slot, occupant) in table.iter().enumerate() {
        let Some(occupant) = occupant else { continue };
        let (h1, h2) = public.candidate_slots(occupant);
        if !members.contains(occupant) || (h1 != slot && h2 != slot) {
            return Err(Error::CorruptSnapshot(format!("slot {slot} is misplaced")));
        }
    }
    for fingerprint in known {
        if table.slot_of(fingerprint).is_none() && !table.dropped().contains(fingerprint) {
            return Err(Error::CorruptSnapshot(format!("{fingerprint} is missing")));
        }
    }

    Ok(())
}

fn check_report(report: &SetupReport, known: &[Fingerprint], table: &CuckooTable) -> Result<()> {
    if report.known != known.len()
        || report.slots != table.len()
        || report.hash_pair != table.hash_pair()
        || report.dropped != table.dropped()
    {
        return Err(Error::CorruptSnapshot("setup report does not match the table".into()));
    }
    Ok(())
}

impl Client {
    /// Writes the client's id, secret material and public table.
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        let snapshot = ClientSnapshotRef {
            version: SNAPSHOT_VERSION,
            id: &self.id,
            secrets: &self.secrets,
            table: &self.table,
        };
        serde_json::to_writer(writer, &snapshot)?;

        Ok(())
    }

    /// Restores a client; fails closed unless the table matches `expected`.
    pub fn load<R: Read>(reader: R, expected: &ProtocolParams) -> Result<Client> {
        let snapshot: ClientSnapshot = read_versioned(reader)?;
        Client::new(snapshot.id, snapshot.secrets, snapshot.table, expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voucher::ItemId;
    use rand_core::OsRng;

    fn server() -> Server {
        Server::setup(
            ProtocolParams::with_threshold(1),
            ["deadbeef", "cafebabe", "0badf00d"].map(Fingerprint::from),
            &mut OsRng,
        )
        .unwrap()
    }

    fn saved(server: &Server) -> serde_json::Value {
        let mut bytes = Vec::new();
        server.save(&mut bytes).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn load(value: &serde_json::Value) -> Result<Server> {
        Server::load(serde_json::to_vec(value).unwrap().as_slice())
    }

    #[test]
    fn test_server_round_trip_keeps_ledgers() {
        let server = server();
        let id = ClientId::new("alice").unwrap();
        server.register_client(id.clone());
        let client =
            Client::generate(id.clone(), server.public_table().clone(), server.params(), &mut OsRng)
                .unwrap();

        let first = client.submit(server.next_item_id(), "deadbeef", b"A".to_vec(), &mut OsRng);
        let second = client.submit(server.next_item_id(), "deadbeef", b"B".to_vec(), &mut OsRng);
        server.process_batch(&id, &[first]).unwrap();

        let restored = load(&saved(&server)).unwrap();

        assert_eq!(restored.clients(), vec![id.clone()]);
        assert_eq!(restored.public_table(), server.public_table());
        assert_eq!(restored.next_item_id(), ItemId(2));

        let report = restored.process_batch(&id, &[second]).unwrap();
        assert_eq!(report.outcome.recovered().len(), 2);
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let mut value = saved(&server());
        value["version"] = (SNAPSHOT_VERSION + 1).into();

        assert!(matches!(
            load(&value),
            Err(Error::UnsupportedSnapshotVersion(v)) if v == SNAPSHOT_VERSION + 1
        ));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let mut value = saved(&server());
        value["annotation"] = "written by a later release".into();

        assert!(load(&value).is_ok());
    }

    #[test]
    fn test_inconsistent_secret_is_rejected() {
        let server = server();
        let mut value = saved(&server);
        let other = serde_json::to_value(Scalar::random(&mut OsRng)).unwrap();
        value["alpha"] = other;

        assert!(load(&value).is_err());
    }

    #[test]
    fn test_truncated_table_is_rejected() {
        let mut value = saved(&server());
        value["public"]["points"].as_array_mut().unwrap().pop();

        assert!(matches!(load(&value), Err(Error::MalformedTable(_))));
    }

    #[test]
    fn test_client_round_trip() {
        let server = server();
        let id = ClientId::new("alice").unwrap();
        server.register_client(id.clone());
        let client =
            Client::generate(id.clone(), server.public_table().clone(), server.params(), &mut OsRng)
                .unwrap();

        let mut bytes = Vec::new();
        client.save(&mut bytes).unwrap();
        let restored = Client::load(bytes.as_slice(), server.params()).unwrap();
        assert_eq!(restored.id(), &id);

        // Vouchers of both copies of the client share one key.
        let vouchers = [
            client.submit(ItemId(0), "cafebabe", b"A".to_vec(), &mut OsRng),
            restored.submit(ItemId(1), "cafebabe", b"B".to_vec(), &mut OsRng),
        ];
        let report = server.process_batch(&id, &vouchers).unwrap();
        assert_eq!(report.outcome.recovered().len(), 2);

        let wrong = ProtocolParams::with_threshold(2);
        assert!(Client::load(bytes.as_slice(), &wrong).is_err());
    }

    #[test]
    fn test_client_without_coefficients_is_rejected() {
        let server = server();
        let id = ClientId::new("alice").unwrap();
        let client =
            Client::generate(id, server.public_table().clone(), server.params(), &mut OsRng)
                .unwrap();

        let mut bytes = Vec::new();
        client.save(&mut bytes).unwrap();
        let mut value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        value["secrets"]["polynomial"]["coeffs"] = serde_json::json!([]);
        let bytes = serde_json::to_vec(&value).unwrap();

        assert!(matches!(
            Client::load(bytes.as_slice(), server.params()),
            Err(Error::CorruptSnapshot(_))
        ));
    }
}
