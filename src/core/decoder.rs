//! Streaming record decoder.
//!
//! Scans one file as a quick-xml token stream. Each element whose local name
//! matches the record tag is copied out on its own and deserialized; nothing
//! outside the current subtree is kept in memory.

use crate::core::progress::StatusSender;
use crate::domain::event::StatusEvent;
use crate::utils::error::{EtlError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// A decoded record tagged with the file it came from.
#[derive(Debug)]
pub struct SourcedRecord<T> {
    pub file: Arc<str>,
    pub raw: T,
}

#[derive(Debug)]
enum SubtreeError {
    /// token stream 本身損毀，無法繼續掃描
    Syntax(String),
    /// 檔案在記錄中途結束
    Truncated,
    /// 子樹可讀但內容不是合法 UTF-8
    Encoding(String),
}

enum Step {
    Record(std::result::Result<String, SubtreeError>),
    Skip,
    Eof,
    Broken(String),
}

#[derive(Debug, Clone)]
pub struct StreamDecoder {
    tag: Vec<u8>,
}

impl StreamDecoder {
    /// `record_tag` may carry a namespace prefix; only its local part is matched.
    pub fn new(record_tag: &str) -> Self {
        let local = record_tag.rsplit(':').next().unwrap_or(record_tag);
        Self {
            tag: local.as_bytes().to_vec(),
        }
    }

    fn matches(&self, start: &BytesStart<'_>) -> bool {
        start.local_name().as_ref() == self.tag.as_slice()
    }

    /// Stream every matching record of `path` into `records`.
    ///
    /// Returns the number of record elements seen. Only a failure to open the
    /// file is returned as an error; record and stream problems are reported
    /// through `status`.
    pub async fn decode_file<T>(
        &self,
        path: &Path,
        records: &mpsc::Sender<SourcedRecord<T>>,
        status: &StatusSender,
        cancel: &CancellationToken,
    ) -> Result<u64>
    where
        T: DeserializeOwned + Send,
    {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| EtlError::FileOpen {
                path: path.to_path_buf(),
                source,
            })?;

        let name: Arc<str> = Arc::from(path.display().to_string());
        status
            .emit(StatusEvent::FileOpened {
                file: name.to_string(),
            })
            .await;

        let mut reader = Reader::from_reader(BufReader::new(file));
        let mut buf = Vec::new();
        let mut subtree_buf = Vec::new();
        let mut seen = 0u64;

        loop {
            if cancel.is_cancelled() {
                tracing::debug!("Cancelled, closing {} after {} records", name, seen);
                break;
            }

            let step = match reader.read_event_into_async(&mut buf).await {
                Ok(Event::Start(start)) if self.matches(&start) => {
                    seen += 1;
                    status.emit(StatusEvent::RecordSeen).await;
                    Step::Record(capture_subtree(&mut reader, start, &mut subtree_buf).await)
                }
                Ok(Event::Empty(start)) if self.matches(&start) => {
                    seen += 1;
                    status.emit(StatusEvent::RecordSeen).await;
                    Step::Record(write_single(Event::Empty(start)))
                }
                Ok(Event::Eof) => Step::Eof,
                Ok(_) => Step::Skip,
                Err(e) => Step::Broken(format!(
                    "XML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )),
            };
            buf.clear();

            match step {
                Step::Skip => {}
                Step::Eof => break,
                Step::Broken(reason) => {
                    status
                        .emit(StatusEvent::FileAborted {
                            file: name.to_string(),
                            reason,
                        })
                        .await;
                    return Ok(seen);
                }
                Step::Record(Ok(xml)) => self.forward::<T>(&name, &xml, records, status).await,
                Step::Record(Err(SubtreeError::Encoding(reason))) => {
                    status
                        .emit(StatusEvent::RecordFailed {
                            file: name.to_string(),
                            reason,
                        })
                        .await;
                }
                Step::Record(Err(err)) => {
                    let reason = match err {
                        SubtreeError::Syntax(reason) => reason,
                        _ => "unexpected end of file inside a record".to_string(),
                    };
                    // 記錄本身算失敗，檔案剩餘部分放棄
                    status
                        .emit(StatusEvent::RecordFailed {
                            file: name.to_string(),
                            reason: reason.clone(),
                        })
                        .await;
                    status
                        .emit(StatusEvent::FileAborted {
                            file: name.to_string(),
                            reason,
                        })
                        .await;
                    return Ok(seen);
                }
            }
        }

        status
            .emit(StatusEvent::FileClosed {
                file: name.to_string(),
                records: seen,
            })
            .await;
        Ok(seen)
    }

    async fn forward<T>(
        &self,
        file: &Arc<str>,
        xml: &str,
        records: &mpsc::Sender<SourcedRecord<T>>,
        status: &StatusSender,
    ) where
        T: DeserializeOwned + Send,
    {
        let raw = match quick_xml::de::from_str::<T>(xml) {
            Ok(raw) => raw,
            Err(e) => {
                let err = EtlError::Decode {
                    file: file.to_string(),
                    message: e.to_string(),
                };
                tracing::debug!("{}", err);
                status
                    .emit(StatusEvent::RecordFailed {
                        file: file.to_string(),
                        reason: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let record = SourcedRecord {
            file: file.clone(),
            raw,
        };
        if records.send(record).await.is_err() {
            status
                .emit(StatusEvent::RecordFailed {
                    file: file.to_string(),
                    reason: "record queue closed".to_string(),
                })
                .await;
        }
    }
}

/// 從已讀到的起始標籤開始，把整個子樹原樣寫回一段獨立的 XML
async fn capture_subtree<R>(
    reader: &mut Reader<R>,
    start: BytesStart<'_>,
    buf: &mut Vec<u8>,
) -> std::result::Result<String, SubtreeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Start(start))
        .map_err(|e| SubtreeError::Syntax(e.to_string()))?;

    let mut depth = 1usize;
    while depth > 0 {
        buf.clear();
        let event = reader
            .read_event_into_async(buf)
            .await
            .map_err(|e| SubtreeError::Syntax(e.to_string()))?;
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(SubtreeError::Truncated),
            _ => {}
        }
        writer
            .write_event(event)
            .map_err(|e| SubtreeError::Syntax(e.to_string()))?;
    }
    buf.clear();

    String::from_utf8(writer.into_inner()).map_err(|e| SubtreeError::Encoding(e.to_string()))
}

fn write_single(event: Event<'_>) -> std::result::Result<String, SubtreeError> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(event)
        .map_err(|e| SubtreeError::Syntax(e.to_string()))?;
    String::from_utf8(writer.into_inner()).map_err(|e| SubtreeError::Encoding(e.to_string()))
}

/// One decode worker: pulls file paths until the queue closes or the run is
/// cancelled. Dropping `records` on return is this worker's completion signal.
pub async fn decode_worker<T>(
    worker_id: usize,
    decoder: Arc<StreamDecoder>,
    files: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
    records: mpsc::Sender<SourcedRecord<T>>,
    status: StatusSender,
    cancel: CancellationToken,
) where
    T: DeserializeOwned + Send + 'static,
{
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let next = { files.lock().await.recv().await };
        let Some(path) = next else {
            break;
        };

        tracing::debug!(worker_id, "Decoding {}", path.display());
        match decoder.decode_file(&path, &records, &status, &cancel).await {
            Ok(seen) => tracing::debug!(worker_id, "Done with {} ({} records)", path.display(), seen),
            Err(e) => {
                status
                    .emit(StatusEvent::FileFailed {
                        file: path.display().to_string(),
                        reason: e.to_string(),
                    })
                    .await;
            }
        }
    }
    tracing::debug!(worker_id, "Decode worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::CaseFile;
    use tempfile::TempDir;

    struct Harness {
        records: Vec<SourcedRecord<CaseFile>>,
        events: Vec<StatusEvent>,
        result: Result<u64>,
    }

    async fn decode(path: &Path, tag: &str) -> Harness {
        let (record_tx, mut record_rx) = mpsc::channel(64);
        let (status_tx, mut status_rx) = mpsc::channel(256);
        let status = StatusSender::new(status_tx);
        let decoder = StreamDecoder::new(tag);

        let result = decoder
            .decode_file::<CaseFile>(path, &record_tx, &status, &CancellationToken::new())
            .await;
        drop(record_tx);
        drop(status);

        let mut records = Vec::new();
        while let Some(record) = record_rx.recv().await {
            records.push(record);
        }
        let mut events = Vec::new();
        while let Some(event) = status_rx.recv().await {
            events.push(event);
        }
        Harness {
            records,
            events,
            result,
        }
    }

    fn count(events: &[StatusEvent], pred: impl Fn(&StatusEvent) -> bool) -> usize {
        events.iter().filter(|e| pred(e)).count()
    }

    const THREE_RECORDS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<trademark-applications-daily>
  <version><version-no>2.0</version-no></version>
  <application-information>
    <file-segments>
      <action-keys>
        <case-file><serial-number>1</serial-number></case-file>
        <case-file>
          <serial-number>2</serial-number>
          <case-file-header><mark-identification>A &amp; B</mark-identification></case-file-header>
        </case-file>
        <case-file><serial-number>3</serial-number></case-file>
      </action-keys>
    </file-segments>
  </application-information>
</trademark-applications-daily>"#;

    #[tokio::test]
    async fn test_decodes_every_matching_element() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daily.xml");
        std::fs::write(&path, THREE_RECORDS).unwrap();

        let harness = decode(&path, "case-file").await;

        assert_eq!(harness.result.unwrap(), 3);
        let serials: Vec<_> = harness
            .records
            .iter()
            .map(|r| r.raw.serial_number.as_str())
            .collect();
        assert_eq!(serials, vec!["1", "2", "3"]);
        assert_eq!(
            harness.records[1].raw.case_file_header.mark_identification,
            "A & B"
        );
        assert_eq!(count(&harness.events, |e| matches!(e, StatusEvent::RecordSeen)), 3);
        assert!(matches!(harness.events.first(), Some(StatusEvent::FileOpened { .. })));
        assert!(matches!(
            harness.events.last(),
            Some(StatusEvent::FileClosed { records: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_bad_record_does_not_stop_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mixed.xml");
        std::fs::write(
            &path,
            r#"<root>
  <case-file><serial-number>1</serial-number></case-file>
  <case-file>
    <serial-number>2</serial-number>
    <classifications><classification>
      <us-code-total-no>many</us-code-total-no>
    </classification></classifications>
  </case-file>
  <case-file><serial-number>3</serial-number></case-file>
</root>"#,
        )
        .unwrap();

        let harness = decode(&path, "case-file").await;

        assert_eq!(harness.result.unwrap(), 3);
        assert_eq!(harness.records.len(), 2);
        assert_eq!(
            count(&harness.events, |e| matches!(e, StatusEvent::RecordFailed { .. })),
            1
        );
        assert!(matches!(
            harness.events.last(),
            Some(StatusEvent::FileClosed { records: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_blank_numbers_and_interleaved_codes_decode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shapes.xml");
        std::fs::write(
            &path,
            r#"<root>
  <case-file>
    <serial-number>1</serial-number>
    <case-file-event-statements>
      <case-file-event-statement><code>NWAP</code><number></number></case-file-event-statement>
    </case-file-event-statements>
  </case-file>
  <case-file>
    <serial-number>2</serial-number>
    <classifications><classification>
      <international-code-total-no/>
      <international-code>009</international-code>
      <us-code>021</us-code>
      <international-code>013</international-code>
    </classification></classifications>
  </case-file>
</root>"#,
        )
        .unwrap();

        let harness = decode(&path, "case-file").await;

        assert_eq!(harness.result.unwrap(), 2);
        assert_eq!(harness.records.len(), 2);
        assert_eq!(
            count(&harness.events, |e| matches!(e, StatusEvent::RecordFailed { .. })),
            0
        );
        let event = &harness.records[0].raw.case_file_event_statements.items[0];
        assert_eq!(event.number, None);
        let class = &harness.records[1].raw.classifications.items[0];
        assert_eq!(class.international_code_total_no, None);
        assert_eq!(class.international_code, vec!["009", "013"]);
        assert_eq!(class.us_code, vec!["021"]);
    }

    #[tokio::test]
    async fn test_truncated_file_fails_open_record_and_aborts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("truncated.xml");
        std::fs::write(
            &path,
            "<root><case-file><serial-number>1</serial-number></case-file><case-file><serial-number>2",
        )
        .unwrap();

        let harness = decode(&path, "case-file").await;

        assert_eq!(harness.result.unwrap(), 2);
        assert_eq!(harness.records.len(), 1);
        assert_eq!(
            count(&harness.events, |e| matches!(e, StatusEvent::RecordFailed { .. })),
            1
        );
        assert!(matches!(
            harness.events.last(),
            Some(StatusEvent::FileAborted { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_record_element_and_namespaced_tag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ns.xml");
        std::fs::write(
            &path,
            r#"<tm:root xmlns:tm="urn:tm"><tm:case-file/><tm:case-file><serial-number>9</serial-number></tm:case-file></tm:root>"#,
        )
        .unwrap();

        let harness = decode(&path, "tm:case-file").await;

        assert_eq!(harness.result.unwrap(), 2);
        assert_eq!(harness.records.len(), 2);
        assert_eq!(harness.records[0].raw, CaseFile::default());
        assert_eq!(harness.records[1].raw.serial_number, "9");
    }

    #[tokio::test]
    async fn test_missing_file_is_a_file_open_error() {
        let dir = TempDir::new().unwrap();
        let harness = decode(&dir.path().join("gone.xml"), "case-file").await;

        assert!(matches!(harness.result, Err(EtlError::FileOpen { .. })));
        assert!(harness.events.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_decoder_reads_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daily.xml");
        std::fs::write(&path, THREE_RECORDS).unwrap();

        let (record_tx, mut record_rx) = mpsc::channel::<SourcedRecord<CaseFile>>(8);
        let (status_tx, _status_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let seen = StreamDecoder::new("case-file")
            .decode_file(&path, &record_tx, &StatusSender::new(status_tx), &cancel)
            .await
            .unwrap();
        drop(record_tx);

        assert_eq!(seen, 0);
        assert!(record_rx.recv().await.is_none());
    }
}
