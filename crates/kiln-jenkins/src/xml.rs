use quick_xml::Reader;
use quick_xml::events::Event;

use crate::JenkinsError;

/// Text of the first `tag` element directly under the document root.
///
/// `None` when there is no such element; an empty element yields an empty string.
pub(crate) fn child_text(xml: &str, tag: &str) -> Result<Option<String>, JenkinsError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut capture: Option<String> = None;
    loop {
        match reader.read_event().map_err(|e| JenkinsError::Xml(e.to_string()))? {
            Event::Start(e) => {
                depth += 1;
                if depth == 2 && e.name().as_ref() == tag.as_bytes() {
                    capture = Some(String::new());
                }
            }
            Event::Empty(e) => {
                if depth == 1 && e.name().as_ref() == tag.as_bytes() {
                    return Ok(Some(String::new()));
                }
            }
            Event::Text(t) => {
                if let Some(buf) = capture.as_mut().filter(|_| depth == 2) {
                    let text = t.unescape().map_err(|e| JenkinsError::Xml(e.to_string()))?;
                    buf.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(buf) = capture.as_mut().filter(|_| depth == 2) {
                    buf.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(_) => {
                if depth == 2 && capture.is_some() {
                    return Ok(capture);
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}
