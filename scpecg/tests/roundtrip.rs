use scpecg::structs::huffman::{HuffmanCode, HuffmanTable, HuffmanTables};
use scpecg::structs::lead::LeadDefinition;
use scpecg::structs::metadata::{FieldValue, Metadata, TAG_LAST_NAME, TAG_PATIENT_ID};
use scpecg::structs::rhythm::{CompressionMode, DifferenceOrder, Lead, Waveform};
use scpecg::{
    DecodeError, Decoder, EncodeError, Record, SectionPayload, SectionStatus, crc, decode,
    encode,
};

fn stamp(bytes: &mut [u8]) {
    let crc = crc::compute(&bytes[2..]);
    bytes[..2].copy_from_slice(&crc.to_le_bytes());
}

fn frame(id: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0, 0];
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&((16 + payload.len()) as u32).to_le_bytes());
    out.extend_from_slice(&[20, 20]);
    out.extend_from_slice(if id == 0 { b"SCPECG" } else { &[0; 6] });
    out.extend_from_slice(payload);
    stamp(&mut out);
    out
}

/// Record from explicit directory entries `(id, length, index)` and body.
fn finish(entries: &[(u16, u32, u32)], body: &[u8]) -> Vec<u8> {
    let mut directory = Vec::new();
    for &(id, length, index) in entries {
        directory.extend_from_slice(&id.to_le_bytes());
        directory.extend_from_slice(&length.to_le_bytes());
        directory.extend_from_slice(&index.to_le_bytes());
    }

    let mut out = vec![0; 6];
    out.extend(frame(0, &directory));
    out.extend_from_slice(body);
    let length = out.len() as u32;
    out[2..6].copy_from_slice(&length.to_le_bytes());
    stamp(&mut out);
    out
}

fn directory_length(sections: usize) -> u32 {
    16 + 10 * (sections as u32 + 1)
}

/// Contiguous record holding `sections` in order.
fn assemble(sections: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let dir_len = directory_length(sections.len());
    let mut entries = vec![(0, dir_len, 7)];
    let mut body = Vec::new();
    let mut offset = 6 + dir_len;

    for (id, payload) in sections {
        let framed = frame(*id, payload);
        entries.push((*id, framed.len() as u32, offset + 1));
        offset += framed.len() as u32;
        body.extend(framed);
    }

    finish(&entries, &body)
}

fn tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(value);
    out
}

fn metadata_payload() -> Vec<u8> {
    let mut out = tlv(TAG_PATIENT_ID, b"A-1024\0");
    out.extend(tlv(TAG_LAST_NAME, b"Smith\0"));
    out.extend(tlv(255, &[]));
    out
}

/// Two simultaneous leads (I and II) of `samples` samples.
fn leads_payload(samples: u32) -> Vec<u8> {
    let mut out = vec![2, 0x14];
    for id in [1u8, 2] {
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&samples.to_le_bytes());
        out.push(id);
    }
    out
}

fn rhythm_payload(order: u8, leads: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&1000u16.to_le_bytes());
    out.extend_from_slice(&2000u16.to_le_bytes());
    out.extend_from_slice(&[order, 0]);
    for lead in leads {
        out.extend_from_slice(&(lead.len() as u16).to_le_bytes());
    }
    for lead in leads {
        out.extend_from_slice(lead);
    }
    out
}

fn i16_bytes(values: &[i16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn plain_record() -> Vec<u8> {
    let lead1 = i16_bytes(&[100, 102, 3]);
    let lead2 = i16_bytes(&[-5, -6, 0]);
    assemble(&[
        (1, metadata_payload()),
        (3, leads_payload(3)),
        (6, rhythm_payload(2, &[&lead1[..], &lead2[..]])),
    ])
}

fn samples(record: &Record, lead: usize) -> Vec<i32> {
    record.waveform().unwrap().leads()[lead].samples().to_vec()
}

#[test]
fn crc_check_value() {
    assert_eq!(crc::compute(b"123456789"), 0x29B1);
    assert!(crc::verify(b"123456789", 0x29B1));
}

#[test]
fn decode_plain_second_difference() {
    let bytes = plain_record();
    let record = decode(&bytes).unwrap();

    assert!(record.crc_valid());
    assert!(record.diagnostics().is_empty());
    assert_eq!(record.length() as usize, bytes.len());
    assert_eq!(record.compression_mode(), Some(CompressionMode::Plain));

    let metadata = record.metadata().unwrap();
    assert_eq!(metadata.patient_id(), Some("A-1024"));
    assert_eq!(metadata.patient_name().as_deref(), Some("Smith"));

    let leads = record.lead_definition().unwrap();
    assert_eq!(leads.leads.len(), 2);

    assert_eq!(samples(&record, 0), vec![100, 102, 107]);
    assert_eq!(samples(&record, 1), vec![-5, -6, -7]);

    let ids: Vec<u16> = record.sections().iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec![0, 1, 3, 6]);
}

#[test]
fn well_formed_record_round_trips() {
    let bytes = plain_record();
    let record = decode(&bytes).unwrap();
    assert_eq!(encode(&record).unwrap(), bytes);
}

#[test]
fn gaps_between_sections_are_kept() {
    // 4 unused bytes between sections 1 and 3
    let s1 = frame(1, &metadata_payload());
    let s3 = frame(3, &leads_payload(1));
    let dir_len = directory_length(2);
    let at1 = 6 + dir_len;
    let at3 = at1 + s1.len() as u32 + 4;

    let mut body = s1.clone();
    body.extend_from_slice(&[0xA5; 4]);
    body.extend_from_slice(&s3);

    let bytes = finish(
        &[
            (0, dir_len, 7),
            (1, s1.len() as u32, at1 + 1),
            (3, s3.len() as u32, at3 + 1),
        ],
        &body,
    );

    let record = decode(&bytes).unwrap();
    assert!(record.diagnostics().is_empty());

    let first = encode(&record).unwrap();
    assert_eq!(first, bytes);
    let second = encode(&decode(&first).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn directory_is_kept_as_stored() {
    // no entry for section 0, and absent entries with stray values
    let s1 = frame(1, &metadata_payload());
    let dir_len = 16 + 10 * 3;
    let at1 = 6 + dir_len;

    let bytes = finish(
        &[(4, 12, 0), (1, s1.len() as u32, at1 + 1), (5, 0, 99)],
        &s1,
    );

    let record = decode(&bytes).unwrap();
    assert!(record.crc_valid());
    assert!(record.diagnostics().is_empty());
    assert_eq!(record.directory().len(), 3);
    assert!(!record.directory()[0].is_present());

    assert_eq!(encode(&record).unwrap(), bytes);
}

#[test]
fn sample_count_beyond_lead_data() {
    let empty: &[u8] = &[];
    let bytes = assemble(&[
        (3, leads_payload(u32::MAX)),
        (6, rhythm_payload(0, &[empty, empty])),
    ]);

    let record = decode(&bytes).unwrap();
    let waveform = record.waveform().unwrap();
    for (i, lead) in waveform.leads().iter().enumerate() {
        assert!(lead.samples().is_empty());
        assert_eq!(
            lead.error(),
            Some(&DecodeError::IncompleteWaveform {
                lead: i,
                decoded: 0,
                expected: u32::MAX as usize,
            })
        );
    }
    assert_eq!(record.diagnostics().len(), 2);

    assert_eq!(encode(&record).unwrap(), bytes);
}

#[test]
fn built_huffman_record() {
    let lead_def = LeadDefinition::simultaneous(&[1, 2], 5);
    let waveform = Waveform::new(
        2500,
        2000,
        DifferenceOrder::Second,
        vec![
            Lead::new(1, vec![0, 4, 9, 15, 20]),
            Lead::new(2, vec![1000, -1000, 3000, -3000, 0]),
        ],
    );

    let record = Record::builder()
        .metadata(Metadata::default().with(TAG_PATIENT_ID, FieldValue::Text("B-7".into())))
        .huffman_tables(HuffmanTables::standard())
        .lead_definition(lead_def)
        .waveform(waveform.clone())
        .build();

    let bytes = encode(&record).unwrap();
    let decoded = decode(&bytes).unwrap();

    assert!(decoded.crc_valid());
    assert!(decoded.diagnostics().is_empty());
    assert_eq!(decoded.compression_mode(), Some(CompressionMode::Huffman));
    assert!(decoded.huffman_tables().unwrap().is_default());
    assert_eq!(decoded.metadata().unwrap().patient_id(), Some("B-7"));
    assert_eq!(samples(&decoded, 0), waveform.leads()[0].samples());
    assert_eq!(samples(&decoded, 1), waveform.leads()[1].samples());

    // directory lists ids 0 to 11, absent ones zeroed
    assert_eq!(decoded.directory().len(), 12);
    assert!(!decoded.directory()[4].is_present());

    assert_eq!(encode(&decoded).unwrap(), bytes);
}

#[test]
fn recompressed_leads_decode_identically() {
    let bytes = plain_record();
    let record = decode(&bytes).unwrap();

    let recompressed = scpecg::Encoder::default()
        .recompress(true)
        .encode(&record)
        .unwrap();
    let again = decode(&recompressed).unwrap();
    assert_eq!(samples(&again, 0), samples(&record, 0));
    assert_eq!(samples(&again, 1), samples(&record, 1));
}

fn switch_tables_payload() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&2u16.to_le_bytes());
    for codes in [
        // table 1: "0" -> 7, "1" -> table 2
        [[1, 1, 1, 7, 0, 0, 0, 0, 0], [1, 1, 0, 2, 0, 1, 0, 0, 0]],
        // table 2: "0" -> -3, "1" -> table 1
        [[1, 1, 1, 0xFD, 0xFF, 0, 0, 0, 0], [1, 1, 0, 1, 0, 1, 0, 0, 0]],
    ] {
        out.extend_from_slice(&2u16.to_le_bytes());
        codes.iter().for_each(|c| out.extend_from_slice(c));
    }
    out
}

#[test]
fn huffman_switch_codes() {
    let bytes = assemble(&[
        (2, switch_tables_payload()),
        (3, leads_payload(4)),
        (6, rhythm_payload(0, &[&[0b0100_1000][..], &[0b0000_0000][..]])),
    ]);

    let record = decode(&bytes).unwrap();
    assert!(record.diagnostics().is_empty());
    assert_eq!(record.huffman_tables().unwrap().tables().len(), 2);
    assert_eq!(samples(&record, 0), vec![7, -3, -3, 7]);
    assert_eq!(samples(&record, 1), vec![7, 7, 7, 7]);
    assert_eq!(encode(&record).unwrap(), bytes);
}

#[test]
fn duplicate_codes_invalidate_tables() {
    let mut tables = Vec::new();
    tables.extend_from_slice(&1u16.to_le_bytes());
    tables.extend_from_slice(&2u16.to_le_bytes());
    tables.extend_from_slice(&[1, 1, 1, 0, 0, 0, 0, 0, 0]);
    tables.extend_from_slice(&[1, 1, 1, 1, 0, 0, 0, 0, 0]);

    let lead = i16_bytes(&[1, 2, 3]);
    let bytes = assemble(&[
        (1, metadata_payload()),
        (2, tables),
        (3, leads_payload(3)),
        (6, rhythm_payload(0, &[&lead[..], &lead[..]])),
    ]);

    let record = decode(&bytes).unwrap();
    let invalid = DecodeError::InvalidCodeTable {
        table: 1,
        code: 2,
        reason: "duplicate code",
    };

    assert_eq!(
        record.section(2).unwrap().status,
        SectionStatus::Invalid(invalid.clone())
    );
    assert_eq!(
        record.section(6).unwrap().status,
        SectionStatus::Invalid(invalid)
    );
    assert!(record.waveform().is_none());
    assert!(record.metadata().is_some());
    assert_eq!(record.compression_mode(), None);
    assert_eq!(record.diagnostics().len(), 2);

    assert!(matches!(
        Decoder::strict().decode(&bytes),
        Err(DecodeError::InvalidCodeTable { .. })
    ));
}

#[test]
fn corrupted_tables_are_missing() {
    let lead = [0u8];
    let mut bytes = assemble(&[
        (2, vec![0x1F, 0x4E]),
        (3, leads_payload(1)),
        (6, rhythm_payload(0, &[&lead[..], &lead[..]])),
    ]);
    // flip the table marker inside section 2 and fix the record CRC
    let at = 6 + directory_length(3) as usize + 16;
    bytes[at] ^= 0xFF;
    stamp(&mut bytes);

    let record = decode(&bytes).unwrap();
    assert!(matches!(
        record.section(2).unwrap().status,
        SectionStatus::Invalid(DecodeError::SectionChecksumInvalid { id: 2, .. })
    ));
    assert_eq!(
        record.section(6).unwrap().status,
        SectionStatus::Invalid(DecodeError::MissingCodeTable { section: 6 })
    );
}

#[test]
fn corrupted_metadata_keeps_waveform() {
    let mut bytes = plain_record();
    let at = 6 + directory_length(3) as usize + 16 + 5;
    bytes[at] ^= 0x20;
    stamp(&mut bytes);

    let record = decode(&bytes).unwrap();
    assert!(record.crc_valid());
    assert!(record.metadata().is_none());
    assert!(matches!(
        record.section(1).unwrap().payload,
        SectionPayload::Opaque(_)
    ));
    assert_eq!(record.diagnostics().len(), 1);
    assert_eq!(record.diagnostics()[0].section, Some(1));
    assert_eq!(samples(&record, 0), vec![100, 102, 107]);

    assert!(matches!(
        Decoder::strict().decode(&bytes),
        Err(DecodeError::SectionChecksumInvalid { id: 1, .. })
    ));

    // re-encoding stamps a fresh section CRC
    let reencoded = encode(&record).unwrap();
    let fixed = decode(&reencoded).unwrap();
    assert!(fixed.diagnostics().is_empty());
    assert!(fixed.metadata().is_some());
}

#[test]
fn record_checksum_mismatch() {
    let mut bytes = plain_record();
    bytes[0] ^= 0x01;

    let record = decode(&bytes).unwrap();
    assert!(!record.crc_valid());
    assert!(matches!(
        record.diagnostics()[0].error,
        DecodeError::ChecksumMismatch { .. }
    ));
    assert_eq!(record.diagnostics()[0].section, None);
    assert!(record.waveform().is_some());

    assert!(matches!(
        Decoder::strict().decode(&bytes),
        Err(DecodeError::ChecksumMismatch { .. })
    ));
}

#[test]
fn truncated_input() {
    let bytes = plain_record();
    let err = decode(&bytes[..bytes.len() - 1]).unwrap_err();
    assert_eq!(
        err,
        DecodeError::TruncatedInput {
            declared: bytes.len(),
            actual: bytes.len() - 1,
        }
    );

    assert!(matches!(
        decode(&bytes[..10]),
        Err(DecodeError::TruncatedInput { .. })
    ));
}

#[test]
fn missing_directory() {
    let mut bytes = vec![0; 6];
    bytes.extend(frame(1, &metadata_payload()));
    let length = bytes.len() as u32;
    bytes[2..6].copy_from_slice(&length.to_le_bytes());
    stamp(&mut bytes);

    assert_eq!(
        decode(&bytes).unwrap_err(),
        DecodeError::MissingDirectory {
            offset: 6,
            found: 1
        }
    );
}

#[test]
fn corrupt_directory_length() {
    let mut directory = Vec::new();
    directory.extend_from_slice(&0u16.to_le_bytes());
    directory.extend_from_slice(&31u32.to_le_bytes());
    directory.extend_from_slice(&7u32.to_le_bytes());
    directory.extend_from_slice(&[0; 5]);

    let mut bytes = vec![0; 6];
    bytes.extend(frame(0, &directory));
    let length = bytes.len() as u32;
    bytes[2..6].copy_from_slice(&length.to_le_bytes());
    stamp(&mut bytes);

    assert_eq!(
        decode(&bytes).unwrap_err(),
        DecodeError::DirectoryCorrupt { length: 31 }
    );
}

#[test]
fn overlapping_sections() {
    let s1 = frame(1, &metadata_payload());
    let s3 = frame(3, &leads_payload(1));
    let dir_len = directory_length(2);
    let at1 = 6 + dir_len;

    let mut body = s1.clone();
    body.extend_from_slice(&s3);

    let bytes = finish(
        &[
            (0, dir_len, 7),
            (1, s1.len() as u32, at1 + 1),
            (3, s3.len() as u32, at1 + 4 + 1),
        ],
        &body,
    );

    assert_eq!(
        decode(&bytes).unwrap_err(),
        DecodeError::SectionOverlap {
            id: 3,
            previous: 1,
            offset: at1 as usize + 4,
        }
    );
}

#[test]
fn section_out_of_bounds() {
    let s1 = frame(1, &metadata_payload());
    let dir_len = directory_length(2);
    let at1 = 6 + dir_len;

    let bytes = finish(
        &[
            (0, dir_len, 7),
            (1, s1.len() as u32, at1 + 1),
            (6, 400, at1 + 1 + s1.len() as u32),
        ],
        &s1,
    );

    assert!(matches!(
        decode(&bytes),
        Err(DecodeError::SectionOutOfBounds { id: 6, length: 400, .. })
    ));
}

#[test]
fn rhythm_without_lead_definition() {
    let lead = i16_bytes(&[1]);
    let bytes = assemble(&[(1, metadata_payload()), (6, rhythm_payload(0, &[&lead[..]]))]);

    let record = decode(&bytes).unwrap();
    assert!(record.metadata().is_some());
    assert_eq!(
        record.section(6).unwrap().status,
        SectionStatus::Invalid(DecodeError::MissingLeadDefinition { section: 6 })
    );
    // an invalid section is written back as stored
    assert_eq!(encode(&record).unwrap(), bytes);
}

#[test]
fn failed_lead_does_not_affect_siblings() {
    let lead1 = i16_bytes(&[100, 102, 3]);
    let lead2 = i16_bytes(&[7]);
    let bytes = assemble(&[
        (3, leads_payload(3)),
        (6, rhythm_payload(2, &[&lead1[..], &lead2[..]])),
    ]);

    let record = decode(&bytes).unwrap();
    let waveform = record.waveform().unwrap();
    assert_eq!(waveform.leads()[0].samples(), &[100, 102, 107]);
    assert!(waveform.leads()[0].error().is_none());
    assert_eq!(waveform.leads()[1].samples(), &[7, 0, 0]);
    assert_eq!(
        waveform.leads()[1].error(),
        Some(&DecodeError::IncompleteWaveform {
            lead: 1,
            decoded: 1,
            expected: 3,
        })
    );
    assert_eq!(record.diagnostics()[0].lead, Some(1));
    assert_eq!(encode(&record).unwrap(), bytes);

    assert!(matches!(
        Decoder::strict().decode(&bytes),
        Err(DecodeError::IncompleteWaveform { lead: 1, .. })
    ));
}

#[test]
fn unknown_sections_are_preserved() {
    let bytes = assemble(&[
        (3, leads_payload(1)),
        (7, vec![1, 2, 3, 4]),
        (200, vec![9; 10]),
    ]);

    let record = decode(&bytes).unwrap();
    assert!(record.diagnostics().is_empty());
    assert_eq!(
        record.section(200).unwrap().payload,
        SectionPayload::Opaque(vec![9; 10].into())
    );
    assert_eq!(encode(&record).unwrap(), bytes);
}

#[test]
fn duplicate_sections_are_rejected_on_encode() {
    let bytes = assemble(&[(1, metadata_payload()), (1, metadata_payload())]);
    let record = decode(&bytes).unwrap();
    assert_eq!(record.sections().len(), 3);

    assert_eq!(
        encode(&record).unwrap_err(),
        EncodeError::DuplicateSection { section: 1 }
    );
}

#[test]
fn explicit_tables_round_trip_through_builder() {
    let tables = HuffmanTables::new(vec![HuffmanTable {
        codes: vec![
            HuffmanCode::value(1, 1, 0, 0),
            HuffmanCode::value(2, 2, 1, 1),
            HuffmanCode::value(2, 10, 0, 3),
        ],
    }])
    .unwrap();

    let record = Record::builder()
        .huffman_tables(tables)
        .lead_definition(LeadDefinition::simultaneous(&[1], 4))
        .waveform(Waveform::new(
            1000,
            1000,
            DifferenceOrder::First,
            vec![Lead::new(1, vec![5, 6, 6, -100])],
        ))
        .build();

    let bytes = encode(&record).unwrap();
    let decoded = decode(&bytes).unwrap();
    assert_eq!(samples(&decoded, 0), vec![5, 6, 6, -100]);

    let unencodable = Record::builder()
        .huffman_tables(HuffmanTables::new(vec![HuffmanTable {
            codes: vec![HuffmanCode::value(1, 1, 0, 0)],
        }])
        .unwrap())
        .lead_definition(LeadDefinition::simultaneous(&[1], 1))
        .waveform(Waveform::new(
            1000,
            1000,
            DifferenceOrder::None,
            vec![Lead::new(1, vec![3])],
        ))
        .build();
    assert_eq!(
        encode(&unencodable).unwrap_err(),
        EncodeError::UnencodableValue { lead: 0, value: 3 }
    );
}
