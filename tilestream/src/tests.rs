use crate::{TileStreamError, TileStreamHeader, compress, crc32, decompress, decompress_into, header_size, payload_size};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31) ^ (i >> 7)) as u8).collect()
}

#[test]
fn header_size_counts_one_entry_per_tile() {
    assert_eq!(header_size(0), 8);
    assert_eq!(header_size(128), 12);
    assert_eq!(header_size(65536), 12);
    assert_eq!(header_size(65537), 16);
}

#[test]
fn multi_tile_payload_survives() -> Result<(), anyhow::Error> {
    let data = pattern(3 * 65536 + 1234);
    let compressed = compress(&data, 6)?;

    let mut out = vec![0u8; data.len()];
    decompress_into(&compressed, &mut out)?;
    assert_eq!(out, data);
    assert_eq!(crc32(&out), crc32(&data));
    Ok(())
}

#[test]
fn exact_tile_multiple() -> Result<(), anyhow::Error> {
    let data = pattern(2 * 65536);
    let compressed = compress(&data, 1)?;

    let header = TileStreamHeader::read(&mut &compressed[..])?;
    assert_eq!(header.num_tiles, 2);
    assert_eq!(header.last_tile_size, 65536);
    assert_eq!(decompress(&compressed)?, data);
    Ok(())
}

#[test]
fn empty_payload_is_just_a_header() -> Result<(), anyhow::Error> {
    let compressed = compress(&[], 6)?;
    assert_eq!(compressed.len(), 8);
    assert!(decompress(&compressed)?.is_empty());
    Ok(())
}

#[test]
fn wrong_destination_size_is_rejected() -> Result<(), anyhow::Error> {
    let compressed = compress(&pattern(100), 6)?;
    let mut out = vec![0u8; 99];
    assert!(matches!(
        decompress_into(&compressed, &mut out),
        Err(TileStreamError::SizeMismatch { expected: 99, actual: 100 })
    ));
    Ok(())
}

#[test]
fn corrupted_id_is_rejected() -> Result<(), anyhow::Error> {
    let mut compressed = compress(&pattern(100), 6)?;
    compressed[1] = 0;
    assert!(matches!(
        decompress(&compressed),
        Err(TileStreamError::InvalidHeader { .. })
    ));
    Ok(())
}

#[test]
fn truncated_tile_data_is_rejected() -> Result<(), anyhow::Error> {
    let compressed = compress(&pattern(70000), 6)?;
    let truncated = &compressed[..compressed.len() - 4];
    let mut out = vec![0u8; 70000];
    assert!(matches!(
        decompress_into(truncated, &mut out),
        Err(TileStreamError::TileOutOfBounds { tile: 1 })
    ));
    Ok(())
}

#[test]
fn payload_size_from_header() -> Result<(), anyhow::Error> {
    for len in [100, 65536, 200000] {
        let compressed = compress(&pattern(len), 6)?;
        let header_len = header_size(len as u64) as usize;
        assert_eq!(payload_size(&compressed[..header_len])?, compressed.len() - header_len);
    }
    Ok(())
}

#[test]
fn known_crc() {
    assert_eq!(crc32(b"123456789"), 0xCBF43926);
}
