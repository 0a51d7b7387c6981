use crate::core::decoder::SourcedRecord;
use crate::core::progress::StatusSender;
use crate::domain::event::StatusEvent;
use crate::domain::model::{
    CaseFile, CaseFileEventStatement, Classification, TransformedCaseFile,
};
use crate::domain::ports::RecordSchema;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Rewrite a compact `YYYYMMDD` date as `YYYY-MM-DD`.
///
/// Already hyphenated dates are returned unchanged, so applying this twice is
/// the same as applying it once. Anything shorter than eight characters or
/// not starting with eight digits becomes an empty string.
pub fn normalize_date(value: &str) -> String {
    let value = value.trim();
    if value.chars().count() < 8 {
        return String::new();
    }
    if is_canonical_date(value) {
        return value.to_string();
    }

    let bytes = value.as_bytes();
    if bytes.len() >= 8 && bytes[..8].iter().all(u8::is_ascii_digit) {
        // 前八個位元組都是 ASCII，切片不會落在字元中間
        format!("{}-{}-{}", &value[0..4], &value[4..6], &value[6..8])
    } else {
        String::new()
    }
}

fn is_canonical_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
}

/// Join non-empty parts with a single space.
pub fn join_text<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut joined = String::new();
    for part in parts.into_iter().map(str::trim).filter(|p| !p.is_empty()) {
        if !joined.is_empty() {
            joined.push(' ');
        }
        joined.push_str(part);
    }
    joined
}

/// Trademark `case-file` schema: dates normalized, repeated sections flattened.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseFileSchema;

impl RecordSchema for CaseFileSchema {
    type Raw = CaseFile;
    type Transformed = TransformedCaseFile;

    fn transform(&self, raw: CaseFile) -> TransformedCaseFile {
        let CaseFile {
            serial_number,
            registration_number,
            transaction_date,
            case_file_header: header,
            case_file_statements,
            case_file_event_statements,
            classifications,
            correspondent,
        } = raw;

        let statements = case_file_statements.items;
        let event_statements: Vec<CaseFileEventStatement> = case_file_event_statements
            .items
            .into_iter()
            .map(|event| CaseFileEventStatement {
                date: normalize_date(&event.date),
                ..event
            })
            .collect();
        let classifications: Vec<Classification> = classifications
            .items
            .into_iter()
            .map(|class| Classification {
                status_date: normalize_date(&class.status_date),
                first_use_anywhere_date: normalize_date(&class.first_use_anywhere_date),
                first_use_in_commerce_date: normalize_date(&class.first_use_in_commerce_date),
                ..class
            })
            .collect();

        let statement_text = join_text(statements.iter().map(|s| s.text.as_str()));
        let event_text = join_text(event_statements.iter().map(|e| e.description_text.as_str()));
        let classification_codes = join_text(classifications.iter().flat_map(|c| {
            c.international_code
                .iter()
                .chain(c.us_code.iter())
                .map(String::as_str)
        }));
        let correspondent_address = join_text(correspondent.lines());
        let correspondent = correspondent
            .lines()
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        TransformedCaseFile {
            serial_number,
            registration_number,
            transaction_date: normalize_date(&transaction_date),
            filing_date: normalize_date(&header.filing_date),
            registration_date: normalize_date(&header.registration_date),
            status_code: header.status_code,
            status_date: normalize_date(&header.status_date),
            mark_identification: header.mark_identification,
            mark_drawing_code: header.mark_drawing_code,
            attorney_name: header.attorney_name,
            statements,
            event_statements,
            classifications,
            correspondent,
            statement_text,
            event_text,
            classification_codes,
            correspondent_address,
        }
    }
}

/// Bounded transform pool member: pulls raw records until the record queue
/// closes and forwards each serialized payload to the accumulator.
pub async fn transform_worker<S: RecordSchema>(
    worker_id: usize,
    schema: Arc<S>,
    records: Arc<Mutex<mpsc::Receiver<SourcedRecord<S::Raw>>>>,
    payloads: mpsc::Sender<String>,
    status: StatusSender,
) {
    let mut transformed = 0u64;
    loop {
        let next = { records.lock().await.recv().await };
        let Some(record) = next else {
            break;
        };

        let SourcedRecord { file, raw } = record;
        let serialized = serde_json::to_string(&schema.transform(raw));
        match serialized {
            Ok(payload) => {
                if payloads.send(payload).await.is_ok() {
                    transformed += 1;
                    status.emit(StatusEvent::RecordTransformed).await;
                } else {
                    status
                        .emit(StatusEvent::RecordFailed {
                            file: file.to_string(),
                            reason: "payload queue closed".to_string(),
                        })
                        .await;
                }
            }
            Err(e) => {
                status
                    .emit(StatusEvent::RecordFailed {
                        file: file.to_string(),
                        reason: format!("serialization failed: {}", e),
                    })
                    .await;
            }
        }
    }
    tracing::debug!(worker_id, transformed, "Transform worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        CaseFileEventStatements, CaseFileHeader, CaseFileStatement, CaseFileStatements,
        Classifications, Correspondent,
    };

    #[test]
    fn test_normalize_compact_date() {
        assert_eq!(normalize_date("20120105"), "2012-01-05");
        assert_eq!(normalize_date(" 19991231 "), "1999-12-31");
        // 超過八碼時只取前八碼
        assert_eq!(normalize_date("20120105123000"), "2012-01-05");
    }

    #[test]
    fn test_normalize_short_or_garbage_dates() {
        assert_eq!(normalize_date("2012010"), "");
        assert_eq!(normalize_date(""), "");
        assert_eq!(normalize_date("abcdefgh"), "");
        assert_eq!(normalize_date("日期日期日期日期"), "");
        assert_eq!(normalize_date("2012年01月05日"), "");
    }

    #[test]
    fn test_normalize_date_is_idempotent() {
        for input in ["20120105", "2012010", "", "2012-01-05", "abcdefgh", "201201051200"] {
            let once = normalize_date(input);
            assert_eq!(normalize_date(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn test_join_text_skips_empty_parts() {
        assert_eq!(join_text(["a", "", "  b ", "c"]), "a b c");
        assert_eq!(join_text(Vec::<&str>::new()), "");
    }

    fn sample_case() -> CaseFile {
        CaseFile {
            serial_number: "75000001".to_string(),
            registration_number: "1234567".to_string(),
            transaction_date: "20120105".to_string(),
            case_file_header: CaseFileHeader {
                filing_date: "2012010".to_string(),
                status_date: "20110301".to_string(),
                mark_identification: "ACME".to_string(),
                ..Default::default()
            },
            case_file_statements: CaseFileStatements {
                items: vec![
                    CaseFileStatement {
                        type_code: "GS0091".to_string(),
                        text: "Anvils".to_string(),
                    },
                    CaseFileStatement {
                        type_code: "GS0092".to_string(),
                        text: "Rocket skates".to_string(),
                    },
                ],
            },
            case_file_event_statements: CaseFileEventStatements {
                items: vec![CaseFileEventStatement {
                    code: "NWAP".to_string(),
                    description_text: "NEW APPLICATION ENTERED".to_string(),
                    date: "19950101".to_string(),
                    number: Some(1),
                    ..Default::default()
                }],
            },
            classifications: Classifications {
                items: vec![Classification {
                    international_code: vec!["009".to_string(), "013".to_string()],
                    us_code: vec!["021".to_string()],
                    first_use_anywhere_date: "19940000".to_string(),
                    ..Default::default()
                }],
            },
            correspondent: Correspondent {
                address_1: "ACME CORP".to_string(),
                address_3: "1 DESERT RD".to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_case_file_transform() {
        let out = CaseFileSchema.transform(sample_case());

        assert_eq!(out.transaction_date, "2012-01-05");
        assert_eq!(out.filing_date, "");
        assert_eq!(out.status_date, "2011-03-01");
        assert_eq!(out.statement_text, "Anvils Rocket skates");
        assert_eq!(out.event_text, "NEW APPLICATION ENTERED");
        assert_eq!(out.event_statements[0].date, "1995-01-01");
        assert_eq!(out.classification_codes, "009 013 021");
        assert_eq!(out.classifications[0].first_use_anywhere_date, "1994-00-00");
        assert_eq!(out.correspondent, vec!["ACME CORP", "1 DESERT RD"]);
        assert_eq!(out.correspondent_address, "ACME CORP 1 DESERT RD");
    }

    #[test]
    fn test_transform_of_empty_record_has_empty_derived_fields() {
        let out = CaseFileSchema.transform(CaseFile::default());
        assert_eq!(out, TransformedCaseFile::default());
    }

    #[tokio::test]
    async fn test_transform_worker_forwards_payloads() {
        let (record_tx, record_rx) = mpsc::channel(4);
        let (payload_tx, mut payload_rx) = mpsc::channel(4);
        let (status_tx, mut status_rx) = mpsc::channel(16);

        let worker = tokio::spawn(transform_worker(
            0,
            Arc::new(CaseFileSchema),
            Arc::new(Mutex::new(record_rx)),
            payload_tx,
            StatusSender::new(status_tx),
        ));

        record_tx
            .send(SourcedRecord {
                file: Arc::from("a.xml"),
                raw: sample_case(),
            })
            .await
            .unwrap();
        drop(record_tx);
        worker.await.unwrap();

        let payload = payload_rx.recv().await.unwrap();
        let doc: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(doc["serial_number"], "75000001");
        assert_eq!(doc["filing_date"], "");
        assert!(payload_rx.recv().await.is_none());

        assert_eq!(status_rx.recv().await, Some(StatusEvent::RecordTransformed));
        assert_eq!(status_rx.recv().await, None);
    }
}
