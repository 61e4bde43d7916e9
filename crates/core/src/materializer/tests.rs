use super::*;
use crate::testing::{protocol_tx, raw_block, test_materializer};
use metafs_common::hash::sha256_hex;
use metafs_store::UserInfoFamily;
use metafs_types::protocol::metaid_for_address;
use metafs_types::record::RecordStatus;
use serde_json::json;

const T0: u64 = 1_700_000_000_000;

fn block_event(chain: ChainKind, height: u64, timestamp_ms: u64, txs: Vec<RawTransaction>) -> BlockEvent {
    BlockEvent::new(
        chain,
        height,
        timestamp_ms,
        BlockPayload::Full(raw_block(height, timestamp_ms / 1000, txs)),
    )
}

const JPEG_5: [u8; 5] = [0xff, 0xd8, 0xff, 0xe0, 0x00];

#[tokio::test]
async fn single_file_create_end_to_end() {
    let (_dir, blob, materializer) = test_materializer();
    let tx = protocol_tx("t0", "addr1", "create", "/file", "image/jpeg", &JPEG_5);
    materializer
        .handle_event(block_event(ChainKind::Btc, 10, T0, vec![tx]))
        .await
        .unwrap();

    let file = materializer.store().get_file_by_pin("t0i0").unwrap().unwrap();
    assert_eq!(file.first_pin_id, "t0i0");
    assert_eq!(file.first_path, "/file");
    assert_eq!(file.size, 5);
    assert_eq!(file.file_type, "image");
    assert_eq!(file.extension, ".jpg");
    assert_eq!(file.storage_path, "indexer/btc/t0i0.jpg");
    assert_eq!(file.status, RecordStatus::Complete);
    assert_eq!(blob.contents("indexer/btc/t0i0.jpg").unwrap(), JPEG_5);

    let sync = materializer
        .store()
        .get_sync_status(ChainKind::Btc)
        .unwrap()
        .unwrap();
    assert_eq!(sync.current_sync_height, 10);
}

#[tokio::test]
async fn modify_via_pin_reference_inherits_first_identity() {
    let (_dir, _blob, materializer) = test_materializer();
    let create = protocol_tx("t0", "addr1", "create", "/file", "image/jpeg", &JPEG_5);
    materializer
        .handle_event(block_event(ChainKind::Btc, 10, T0, vec![create]))
        .await
        .unwrap();

    let modify = protocol_tx("t1", "addr1", "modify", "@t0i0", "image/jpeg", &[0xff, 0xd8, 0xff, 0xe1, 0x01]);
    materializer
        .handle_event(block_event(ChainKind::Btc, 11, T0 + 1000, vec![modify]))
        .await
        .unwrap();

    let pin = materializer.store().get_pin_info("t1i0").unwrap().unwrap();
    assert_eq!(pin.first_pin_id, "t0i0");
    assert_eq!(pin.first_path, "/file");

    let latest = materializer.store().get_latest_file("t0i0").unwrap().unwrap();
    assert_eq!(latest.pin_id, "t1i0");

    let history = materializer.store().file_history("t0i0").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].pin_id, "t1i0"); // newest first
    assert_eq!(history[1].pin_id, "t0i0");
}

fn chunk_payloads() -> (Vec<u8>, Vec<u8>) {
    (vec![0xaa; 100], vec![0xbb; 50])
}

fn index_descriptor_payload(c1: &[u8], c2: &[u8]) -> Vec<u8> {
    let merged: Vec<u8> = c1.iter().chain(c2).copied().collect();
    json!({
        "name": "data.bin",
        "dataType": "application/octet-stream",
        "sha256": sha256_hex(&merged),
        "fileSize": 150.0,
        "chunkNumber": 2.0,
        "chunkSize": 100,
        "chunkList": [
            {"sha256": sha256_hex(c1), "pinId": "c1i0"},
            {"sha256": sha256_hex(c2), "pinId": "c2i0"}
        ]
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn chunked_file_assembles_after_index_record() {
    let (_dir, blob, materializer) = test_materializer();
    let (p1, p2) = chunk_payloads();

    for (height, tx) in [
        (20, protocol_tx("c1", "addr", "create", "/file/_chunk", "metafile/chunk", &p1)),
        (21, protocol_tx("c2", "addr", "create", "/file/_chunk", "metafile/chunk", &p2)),
    ] {
        materializer
            .handle_event(block_event(ChainKind::Btc, height, T0 + height, vec![tx]))
            .await
            .unwrap();
    }
    // No assembled file yet.
    assert!(materializer.store().get_file_by_pin("idxi0").unwrap().is_none());

    let index = protocol_tx(
        "idx",
        "addr",
        "create",
        "/file/index",
        "metafile/index",
        &index_descriptor_payload(&p1, &p2),
    );
    materializer
        .handle_event(block_event(ChainKind::Btc, 22, T0 + 22, vec![index]))
        .await
        .unwrap();

    let file = materializer.store().get_file_by_pin("idxi0").unwrap().unwrap();
    assert_eq!(file.size, 150);
    assert_eq!(file.name, "data.bin");
    assert_eq!(file.extension, ".bin");
    let merged = blob.contents(&file.storage_path).unwrap();
    assert_eq!(merged.len(), 150);
    assert_eq!(&merged[..100], &p1[..]);
    assert_eq!(&merged[100..], &p2[..]);
    assert_eq!(file.sha256, sha256_hex(&merged));

    // Both chunks carry parent and ordinal.
    let c1 = materializer.store().get_chunk("c1i0").unwrap().unwrap();
    let c2 = materializer.store().get_chunk("c2i0").unwrap().unwrap();
    assert_eq!((c1.parent_pin_id.as_str(), c1.chunk_index), ("idxi0", 0));
    assert_eq!((c2.parent_pin_id.as_str(), c2.chunk_index), ("idxi0", 1));
    // Size equals the sum of chunk sizes.
    assert_eq!(file.size, c1.size + c2.size);
}

#[tokio::test]
async fn late_chunk_arrival_triggers_assembly() {
    let (_dir, blob, materializer) = test_materializer();
    let (p1, p2) = chunk_payloads();

    // Index first, then chunks out of order.
    let index = protocol_tx(
        "idx",
        "addr",
        "create",
        "/file/index",
        "metafile/index",
        &index_descriptor_payload(&p1, &p2),
    );
    materializer
        .handle_event(block_event(ChainKind::Btc, 30, T0, vec![index]))
        .await
        .unwrap();
    assert!(materializer.store().get_file_by_pin("idxi0").unwrap().is_none());

    let chunk2 = protocol_tx("c2", "addr", "create", "/file/_chunk", "metafile/chunk", &p2);
    materializer
        .handle_event(block_event(ChainKind::Btc, 31, T0 + 1, vec![chunk2]))
        .await
        .unwrap();
    assert!(materializer.store().get_file_by_pin("idxi0").unwrap().is_none());

    let chunk1 = protocol_tx("c1", "addr", "create", "/file/_chunk", "metafile/chunk", &p1);
    materializer
        .handle_event(block_event(ChainKind::Btc, 32, T0 + 2, vec![chunk1]))
        .await
        .unwrap();

    let file = materializer.store().get_file_by_pin("idxi0").unwrap().unwrap();
    assert_eq!(file.size, 150);
    let merged = blob.contents(&file.storage_path).unwrap();
    assert_eq!(&merged[..100], &p1[..]);
    assert_eq!(&merged[100..], &p2[..]);
}

#[tokio::test]
async fn replaying_a_block_is_idempotent() {
    let (_dir, _blob, materializer) = test_materializer();
    let tx = protocol_tx("t0", "addr1", "create", "/file", "image/jpeg", &JPEG_5);
    for _ in 0..3 {
        materializer
            .handle_event(block_event(ChainKind::Btc, 10, T0, vec![tx.clone()]))
            .await
            .unwrap();
    }
    assert_eq!(materializer.store().file_history("t0i0").unwrap().len(), 1);
    assert_eq!(materializer.store().get_counter("file_count").unwrap(), 1);
    assert_eq!(materializer.store().get_counter("pin_count").unwrap(), 1);
}

#[tokio::test]
async fn user_records_update_latest_history_and_mappings() {
    let (_dir, _blob, materializer) = test_materializer();
    let metaid = metaid_for_address("addr1");

    let name1 = protocol_tx("n1", "addr1", "create", "/info/name", "text/plain", b"alice");
    materializer
        .handle_event(block_event(ChainKind::Mvc, 5, T0, vec![name1]))
        .await
        .unwrap();
    let name2 = protocol_tx("n2", "addr1", "modify", "@n1i0", "text/plain", b"alice2");
    materializer
        .handle_event(block_event(ChainKind::Mvc, 6, T0 + 500, vec![name2]))
        .await
        .unwrap();

    let latest = materializer
        .store()
        .get_user_latest(UserInfoFamily::Name, &metaid)
        .unwrap()
        .unwrap();
    assert_eq!(latest.value, "alice2");
    let history = materializer
        .store()
        .user_history(UserInfoFamily::Name, &metaid)
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(
        latest.timestamp,
        history.iter().map(|h| h.timestamp).max().unwrap()
    );

    // Bidirectional mapping and earliest-activity index.
    assert_eq!(
        materializer.store().get_address_by_metaid(&metaid).unwrap().unwrap(),
        "addr1"
    );
    assert_eq!(
        materializer.store().get_metaid_by_address("addr1").unwrap().unwrap(),
        metaid
    );
    assert_eq!(
        materializer.store().list_users_chronological(10).unwrap(),
        vec![metaid]
    );
}

#[tokio::test]
async fn avatar_payload_lands_in_avatar_blob_path() {
    let (_dir, blob, materializer) = test_materializer();
    let avatar = protocol_tx("a0", "addr2", "create", "/info/avatar", "image/jpeg", &JPEG_5);
    materializer
        .handle_event(block_event(ChainKind::Btc, 7, T0, vec![avatar]))
        .await
        .unwrap();

    let metaid = metaid_for_address("addr2");
    let latest = materializer
        .store()
        .get_user_latest(UserInfoFamily::Avatar, &metaid)
        .unwrap()
        .unwrap();
    assert_eq!(latest.value, "indexer/avatar/btc/a0/a0i0.jpg");
    assert_eq!(blob.contents(&latest.value).unwrap(), JPEG_5);
}

#[tokio::test]
async fn chat_key_path_is_case_insensitive() {
    let (_dir, _blob, materializer) = test_materializer();
    let key = protocol_tx(
        "k0",
        "addr3",
        "create",
        "/info/chatPublicKey",
        "text/plain",
        b"pubkey-bytes",
    );
    materializer
        .handle_event(block_event(ChainKind::Btc, 8, T0, vec![key]))
        .await
        .unwrap();
    let metaid = metaid_for_address("addr3");
    let latest = materializer
        .store()
        .get_user_latest(UserInfoFamily::ChatKey, &metaid)
        .unwrap()
        .unwrap();
    assert_eq!(latest.value, "pubkey-bytes");
}

#[tokio::test]
async fn gzip_payloads_are_transparently_inflated() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let (_dir, blob, materializer) = test_materializer();
    let original = b"not actually compressed much".to_vec();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&original).unwrap();
    let compressed = encoder.finish().unwrap();

    let tx = protocol_tx("g0", "addr", "create", "/file", "text/plain", &compressed);
    materializer
        .handle_event(block_event(ChainKind::Btc, 9, T0, vec![tx]))
        .await
        .unwrap();

    let file = materializer.store().get_file_by_pin("g0i0").unwrap().unwrap();
    assert!(file.compressed);
    assert_eq!(file.size, original.len() as u64);
    assert_eq!(blob.contents(&file.storage_path).unwrap(), original);
}

#[tokio::test]
async fn unrecognized_paths_are_gated_out() {
    let (_dir, _blob, materializer) = test_materializer();
    let tx = protocol_tx("x0", "addr", "create", "/protocols/simplebuzz", "application/json", b"{}");
    materializer
        .handle_event(block_event(ChainKind::Btc, 12, T0, vec![tx]))
        .await
        .unwrap();
    assert!(materializer.store().get_pin_info("x0i0").unwrap().is_none());
    assert!(materializer.store().get_file_by_pin("x0i0").unwrap().is_none());
}

#[tokio::test]
async fn unresolvable_reference_defaults_to_self_and_is_gated() {
    let (_dir, _blob, materializer) = test_materializer();
    let tx = protocol_tx("y0", "addr", "modify", "@missingi0", "image/jpeg", &JPEG_5);
    materializer
        .handle_event(block_event(ChainKind::Btc, 13, T0, vec![tx]))
        .await
        .unwrap();
    // The record became its own origin, whose path `@missingi0` is not a
    // recognized protocol path, so nothing was materialized. The block still
    // completed.
    assert!(materializer.store().get_pin_info("y0i0").unwrap().is_none());
    let sync = materializer
        .store()
        .get_sync_status(ChainKind::Btc)
        .unwrap()
        .unwrap();
    assert_eq!(sync.current_sync_height, 13);
}

#[tokio::test]
async fn blob_failure_aborts_only_the_record() {
    let (_dir, blob, materializer) = test_materializer();
    blob.fail_next_puts(1);
    let failing = protocol_tx("b0", "addr", "create", "/file", "image/jpeg", &JPEG_5);
    let surviving = protocol_tx("b1", "addr", "create", "/file", "image/jpeg", &JPEG_5);
    materializer
        .handle_event(block_event(ChainKind::Btc, 14, T0, vec![failing, surviving]))
        .await
        .unwrap();

    assert!(materializer.store().get_file_by_pin("b0i0").unwrap().is_none());
    assert!(materializer.store().get_file_by_pin("b1i0").unwrap().is_some());
    let sync = materializer
        .store()
        .get_sync_status(ChainKind::Btc)
        .unwrap()
        .unwrap();
    assert_eq!(sync.current_sync_height, 14);
}

#[tokio::test]
async fn revoke_marks_the_row_revoked() {
    let (_dir, _blob, materializer) = test_materializer();
    let create = protocol_tx("t0", "addr1", "create", "/file", "image/jpeg", &JPEG_5);
    materializer
        .handle_event(block_event(ChainKind::Btc, 10, T0, vec![create]))
        .await
        .unwrap();
    let revoke = protocol_tx("t1", "addr1", "revoke", "@t0i0", "image/jpeg", &[]);
    materializer
        .handle_event(block_event(ChainKind::Btc, 11, T0 + 1, vec![revoke]))
        .await
        .unwrap();

    let latest = materializer.store().get_latest_file("t0i0").unwrap().unwrap();
    assert_eq!(latest.pin_id, "t1i0");
    assert_eq!(latest.status, RecordStatus::Revoked);
}

#[tokio::test]
async fn stale_records_never_move_latest_backwards() {
    let (_dir, _blob, materializer) = test_materializer();
    let create = protocol_tx("t0", "addr1", "create", "/file", "image/jpeg", &JPEG_5);
    materializer
        .handle_event(block_event(ChainKind::Btc, 10, T0 + 5000, vec![create]))
        .await
        .unwrap();
    // An older modify replays out of order (e.g. via rescan).
    let old_modify = protocol_tx("t1", "addr1", "modify", "@t0i0", "image/jpeg", &JPEG_5);
    materializer
        .handle_event(block_event(ChainKind::Btc, 9, T0, vec![old_modify]))
        .await
        .unwrap();

    let latest = materializer.store().get_latest_file("t0i0").unwrap().unwrap();
    assert_eq!(latest.pin_id, "t0i0");
    // Both versions remain in history.
    assert_eq!(materializer.store().file_history("t0i0").unwrap().len(), 2);
}
