use serde::{Deserialize, Deserializer, Serialize};

/// 數字欄位允許空元素（`<number/>`、`<number> </number>`），視為沒有值
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|e| serde::de::Error::custom(format!("invalid number {:?}: {}", trimmed, e)))
}

/// 一筆 `<case-file>` 元素解碼後的原始結構
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CaseFile {
    pub serial_number: String,
    pub registration_number: String,
    pub transaction_date: String,
    pub case_file_header: CaseFileHeader,
    pub case_file_statements: CaseFileStatements,
    pub case_file_event_statements: CaseFileEventStatements,
    pub classifications: Classifications,
    pub correspondent: Correspondent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CaseFileHeader {
    pub filing_date: String,
    pub registration_date: String,
    pub status_code: String,
    pub status_date: String,
    pub mark_identification: String,
    pub mark_drawing_code: String,
    pub attorney_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseFileStatements {
    #[serde(rename = "case-file-statement")]
    pub items: Vec<CaseFileStatement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CaseFileStatement {
    pub type_code: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseFileEventStatements {
    #[serde(rename = "case-file-event-statement")]
    pub items: Vec<CaseFileEventStatement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CaseFileEventStatement {
    pub code: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub description_text: String,
    pub date: String,
    #[serde(deserialize_with = "blank_as_none")]
    pub number: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Classifications {
    #[serde(rename = "classification")]
    pub items: Vec<Classification>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Classification {
    #[serde(deserialize_with = "blank_as_none")]
    pub international_code_total_no: Option<u32>,
    #[serde(deserialize_with = "blank_as_none")]
    pub us_code_total_no: Option<u32>,
    pub international_code: Vec<String>,
    pub us_code: Vec<String>,
    pub status_code: String,
    pub status_date: String,
    pub first_use_anywhere_date: String,
    pub first_use_in_commerce_date: String,
    pub primary_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Correspondent {
    #[serde(rename = "address-1")]
    pub address_1: String,
    #[serde(rename = "address-2")]
    pub address_2: String,
    #[serde(rename = "address-3")]
    pub address_3: String,
    #[serde(rename = "address-4")]
    pub address_4: String,
    #[serde(rename = "address-5")]
    pub address_5: String,
}

impl Correspondent {
    pub fn lines(&self) -> [&str; 5] {
        [
            &self.address_1,
            &self.address_2,
            &self.address_3,
            &self.address_4,
            &self.address_5,
        ]
    }
}

/// 送往索引端的扁平化文件。日期欄位皆已正規化為 `YYYY-MM-DD` 或空字串。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformedCaseFile {
    pub serial_number: String,
    pub registration_number: String,
    pub transaction_date: String,
    pub filing_date: String,
    pub registration_date: String,
    pub status_code: String,
    pub status_date: String,
    pub mark_identification: String,
    pub mark_drawing_code: String,
    pub attorney_name: String,
    pub statements: Vec<CaseFileStatement>,
    pub event_statements: Vec<CaseFileEventStatement>,
    pub classifications: Vec<Classification>,
    pub correspondent: Vec<String>,
    // 全文檢索用的合併欄位
    pub statement_text: String,
    pub event_text: String,
    pub classification_codes: String,
    pub correspondent_address: String,
}

/// A sealed group of serialized payloads. Only the accumulator builds these.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    id: u64,
    payloads: Vec<String>,
}

impl Batch {
    pub(crate) fn seal(id: u64, payloads: Vec<String>) -> Self {
        Self { id, payloads }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn payloads(&self) -> &[String] {
        &self.payloads
    }

    /// Bulk request body: `{"docs":[<payload>,<payload>,...]}`.
    ///
    /// Payloads are already serialized JSON objects, so they are joined verbatim.
    pub fn body(&self) -> String {
        let inner_len: usize = self.payloads.iter().map(|p| p.len() + 1).sum();
        let mut body = String::with_capacity(inner_len + 10);
        body.push_str("{\"docs\":[");
        body.push_str(&self.payloads.join(","));
        body.push_str("]}");
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_body_is_valid_json() {
        let batch = Batch::seal(
            7,
            vec![r#"{"a":1}"#.to_string(), r#"{"a":2}"#.to_string()],
        );

        let body = batch.body();
        assert_eq!(body, r#"{"docs":[{"a":1},{"a":2}]}"#);

        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["docs"].as_array().unwrap().len(), 2);
        assert_eq!(batch.id(), 7);
    }

    #[test]
    fn test_case_file_from_xml_subtree() {
        let xml = r#"
<case-file>
  <serial-number>75000001</serial-number>
  <registration-number>0000001</registration-number>
  <transaction-date>20120105</transaction-date>
  <case-file-header>
    <filing-date>19950101</filing-date>
    <status-code>800</status-code>
    <mark-identification>ACME</mark-identification>
  </case-file-header>
  <case-file-statements>
    <case-file-statement><type-code>GS0091</type-code><text>Anvils</text></case-file-statement>
    <case-file-statement><type-code>GS0092</type-code><text>Rockets</text></case-file-statement>
  </case-file-statements>
  <classifications>
    <classification>
      <international-code-total-no>2</international-code-total-no>
      <international-code>009</international-code>
      <international-code>013</international-code>
      <us-code>021</us-code>
    </classification>
  </classifications>
  <correspondent>
    <address-1>ACME CORP</address-1>
    <address-2>1 DESERT RD</address-2>
  </correspondent>
</case-file>"#;

        let case: CaseFile = quick_xml::de::from_str(xml).unwrap();

        assert_eq!(case.serial_number, "75000001");
        assert_eq!(case.case_file_header.filing_date, "19950101");
        assert_eq!(case.case_file_statements.items.len(), 2);
        assert_eq!(case.case_file_statements.items[1].text, "Rockets");
        assert_eq!(
            case.classifications.items[0].international_code,
            vec!["009".to_string(), "013".to_string()]
        );
        assert_eq!(case.classifications.items[0].international_code_total_no, Some(2));
        assert_eq!(case.correspondent.address_2, "1 DESERT RD");
        assert!(case.case_file_event_statements.items.is_empty());
    }

    #[test]
    fn test_blank_numeric_elements_are_none() {
        let xml = r#"
<case-file>
  <serial-number>75000002</serial-number>
  <case-file-event-statements>
    <case-file-event-statement>
      <code>NWAP</code>
      <date>19950101</date>
      <number></number>
    </case-file-event-statement>
    <case-file-event-statement>
      <code>MPUB</code>
      <number> 7 </number>
    </case-file-event-statement>
  </case-file-event-statements>
  <classifications>
    <classification>
      <international-code-total-no/>
      <us-code-total-no> </us-code-total-no>
      <international-code>009</international-code>
    </classification>
  </classifications>
</case-file>"#;

        let case: CaseFile = quick_xml::de::from_str(xml).unwrap();

        let events = &case.case_file_event_statements.items;
        assert_eq!(events[0].number, None);
        assert_eq!(events[1].number, Some(7));
        let class = &case.classifications.items[0];
        assert_eq!(class.international_code_total_no, None);
        assert_eq!(class.us_code_total_no, None);
        assert_eq!(class.international_code, vec!["009".to_string()]);
    }

    #[test]
    fn test_garbage_numeric_element_still_fails() {
        let xml = r#"<case-file><classifications><classification><us-code-total-no>NaN</us-code-total-no></classification></classifications></case-file>"#;
        assert!(quick_xml::de::from_str::<CaseFile>(xml).is_err());
    }

    #[test]
    fn test_interleaved_code_lists_are_collected() {
        let xml = r#"
<case-file>
  <classifications>
    <classification>
      <international-code>009</international-code>
      <us-code>021</us-code>
      <international-code>013</international-code>
      <us-code>023</us-code>
      <primary-code>009</primary-code>
    </classification>
  </classifications>
</case-file>"#;

        let case: CaseFile = quick_xml::de::from_str(xml).unwrap();

        let class = &case.classifications.items[0];
        assert_eq!(class.international_code, vec!["009".to_string(), "013".to_string()]);
        assert_eq!(class.us_code, vec!["021".to_string(), "023".to_string()]);
        assert_eq!(class.primary_code, "009");
    }
}
