//! Quality Issue Report reader.
//!
//! The document is validated while it streams through a namespace-aware
//! quick-xml reader: each element must be in the QIAP namespace and appear
//! under its permitted parent, mandatory attributes must be present, and the
//! object graph setters reject duplicated or conflicting content. Every
//! failure is reported as an XML error carrying the line it occurred on.

use crate::action::{Action, ActionType, Algorithm};
use crate::issue::{AffectedProduct, AffectedValue, QualityIssue, Report};
use crate::NAMESPACE;
use qiap_error::{QiapError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use std::path::Path;
use tracing::{debug, info};

/// Read and validate the report stored at `path`.
pub fn read_report(path: impl AsRef<Path>) -> Result<Report> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path).map_err(|err| {
        QiapError::io(
            format!("failed to open Quality Issue Report file '{}'", path.display()),
            err,
        )
    })?;
    let report = parse_report(&xml)?;
    info!(
        path = %path.display(),
        issues = report.issues().len(),
        "loaded quality issue report"
    );
    Ok(report)
}

/// Parse and validate a report document held in memory.
pub fn parse_report(xml: &str) -> Result<Report> {
    let mut reader = NsReader::from_str(xml);
    let mut state = ReaderState::default();

    loop {
        let (in_namespace, event) = match reader.read_resolved_event() {
            Ok((ns, event)) => (
                matches!(ns, ResolveResult::Bound(Namespace(uri)) if uri == NAMESPACE.as_bytes()),
                event,
            ),
            Err(err) => {
                return Err(QiapError::xml(
                    line_at(xml, reader.buffer_position()),
                    format!("parse error ({err})"),
                ))
            }
        };
        let line = line_at(xml, reader.buffer_position());
        let step = match event {
            Event::Start(element) => state.start(&element, in_namespace),
            Event::Empty(element) => state
                .start(&element, in_namespace)
                .and_then(|()| state.end()),
            Event::End(_) => state.end(),
            Event::Text(text) => text
                .unescape()
                .map_err(|err| QiapError::xml(line, format!("parse error ({err})")))
                .map(|text| state.text(&text)),
            Event::CData(data) => {
                state.text(&String::from_utf8_lossy(&data));
                Ok(())
            }
            Event::Eof => break,
            _ => Ok(()),
        };
        step.map_err(|err| in_document(err, line))?;
    }

    if let Some(frame) = state.stack.last() {
        return Err(QiapError::xml(
            line_at(xml, xml.len()),
            format!("unexpected end of document inside {}", frame.tag.name()),
        ));
    }
    state.finished.ok_or_else(|| {
        QiapError::xml(
            line_at(xml, xml.len()),
            "document has no QualityIssueReport element",
        )
    })
}

fn line_at(xml: &str, position: usize) -> u64 {
    let end = position.min(xml.len());
    1 + xml.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() as u64
}

fn in_document(err: QiapError, line: u64) -> QiapError {
    match err {
        QiapError::Xml { .. } => err,
        QiapError::InvalidArgument(message) => QiapError::xml(line, message),
        other => QiapError::xml(line, other.to_string()),
    }
}

/// Signed integer with optional surrounding spaces.
pub(crate) fn parse_integer(text: &str) -> Result<i64> {
    let trimmed = text.trim_matches(' ');
    let digits = trimmed.trim_start_matches(['+', '-']);
    if trimmed.len() - digits.len() > 1 {
        return Err(QiapError::invalid_argument("invalid format for integer value"));
    }
    if digits.is_empty() || !digits.as_bytes()[0].is_ascii_digit() {
        return Err(QiapError::invalid_argument("invalid integer value (no digits)"));
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(QiapError::invalid_argument("invalid format for integer value"));
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| QiapError::invalid_argument("integer value too large"))
}

// ============================================================================
// Element state machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Action,
    AffectedProducts,
    AffectedValues,
    Algorithm,
    Cause,
    Description,
    Extent,
    Instrument,
    Parameter,
    Product,
    QualityIssueReport,
    QualityIssue,
    Resolution,
    Title,
    Value,
}

impl Tag {
    const ALL: [Tag; 15] = [
        Tag::Action,
        Tag::AffectedProducts,
        Tag::AffectedValues,
        Tag::Algorithm,
        Tag::Cause,
        Tag::Description,
        Tag::Extent,
        Tag::Instrument,
        Tag::Parameter,
        Tag::Product,
        Tag::QualityIssueReport,
        Tag::QualityIssue,
        Tag::Resolution,
        Tag::Title,
        Tag::Value,
    ];

    fn name(self) -> &'static str {
        match self {
            Tag::Action => "Action",
            Tag::AffectedProducts => "AffectedProducts",
            Tag::AffectedValues => "AffectedValues",
            Tag::Algorithm => "Algorithm",
            Tag::Cause => "Cause",
            Tag::Description => "Description",
            Tag::Extent => "Extent",
            Tag::Instrument => "Instrument",
            Tag::Parameter => "Parameter",
            Tag::Product => "Product",
            Tag::QualityIssueReport => "QualityIssueReport",
            Tag::QualityIssue => "QualityIssue",
            Tag::Resolution => "Resolution",
            Tag::Title => "Title",
            Tag::Value => "Value",
        }
    }

    fn from_name(name: &str) -> Option<Tag> {
        Self::ALL.into_iter().find(|tag| tag.name() == name)
    }
}

struct Frame {
    tag: Tag,
    /// Accumulated character data, for elements that carry text.
    text: Option<String>,
}

#[derive(Default)]
struct ReaderState {
    stack: Vec<Frame>,
    report: Option<Report>,
    issue: Option<QualityIssue>,
    product: Option<AffectedProduct>,
    value: Option<AffectedValue>,
    action: Option<Action>,
    algorithm: Option<Algorithm>,
    parameter_key: Option<String>,
    finished: Option<Report>,
}

fn open<'a, T>(slot: &'a mut Option<T>, tag: Tag) -> Result<&'a mut T> {
    slot.as_mut()
        .ok_or_else(|| QiapError::invalid_argument(format!("element {} is not open", tag.name())))
}

fn take<T>(slot: &mut Option<T>, tag: Tag) -> Result<T> {
    slot.take()
        .ok_or_else(|| QiapError::invalid_argument(format!("element {} is not open", tag.name())))
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|err| QiapError::invalid_argument(format!("parse error ({err})")))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|err| QiapError::invalid_argument(format!("parse error ({err})")))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn mandatory(element: &BytesStart<'_>, name: &str, tag: Tag) -> Result<String> {
    attribute(element, name)?.ok_or_else(|| {
        QiapError::invalid_argument(format!(
            "mandatory attribute '{name}' missing for element '{}'",
            tag.name()
        ))
    })
}

impl ReaderState {
    fn start(&mut self, element: &BytesStart<'_>, in_namespace: bool) -> Result<()> {
        let local = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
        let tag = match Tag::from_name(&local) {
            Some(tag) if in_namespace => tag,
            _ => {
                let qualified = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                return Err(QiapError::invalid_argument(format!(
                    "element {qualified} not allowed"
                )));
            }
        };
        let parent = self.stack.last().map(|frame| frame.tag);

        let allowed = match tag {
            Tag::Action => matches!(
                parent,
                Some(Tag::AffectedProducts | Tag::AffectedValues)
            ),
            Tag::AffectedProducts => parent == Some(Tag::QualityIssue),
            Tag::AffectedValues => parent == Some(Tag::AffectedProducts),
            Tag::Algorithm => {
                parent == Some(Tag::Action)
                    && self
                        .action
                        .as_ref()
                        .is_some_and(|a| a.action_type() == ActionType::CustomCorrection)
            }
            Tag::Cause | Tag::Description | Tag::Instrument | Tag::Resolution | Tag::Title => {
                parent == Some(Tag::QualityIssue)
            }
            Tag::Extent => matches!(
                parent,
                Some(Tag::AffectedProducts | Tag::AffectedValues)
            ),
            Tag::Parameter => parent == Some(Tag::Algorithm),
            Tag::Product => parent == Some(Tag::AffectedProducts),
            Tag::QualityIssueReport => parent.is_none() && self.finished.is_none(),
            Tag::QualityIssue => parent == Some(Tag::QualityIssueReport),
            Tag::Value => parent == Some(Tag::AffectedValues),
        };
        if !allowed {
            return Err(QiapError::invalid_argument(match parent {
                None => format!("element {} not allowed as root", tag.name()),
                Some(parent) => format!(
                    "element {} not allowed as child of {}",
                    tag.name(),
                    parent.name()
                ),
            }));
        }

        let mut has_text = false;
        match tag {
            Tag::QualityIssueReport => {
                let organisation = mandatory(element, "organisation", tag)?;
                self.report = Some(Report::new(organisation));
            }
            Tag::QualityIssue => {
                let id = parse_integer(&mandatory(element, "id", tag)?)?;
                let last_modified = mandatory(element, "last-modified", tag)?;
                let mission = mandatory(element, "mission", tag)?;
                self.issue = Some(QualityIssue::new(id, last_modified, mission));
            }
            Tag::AffectedProducts => {
                let id = parse_integer(&mandatory(element, "id", tag)?)?;
                let product_type = mandatory(element, "product_type", tag)?;
                self.product = Some(AffectedProduct::new(id, product_type));
            }
            Tag::AffectedValues => {
                let id = parse_integer(&mandatory(element, "id", tag)?)?;
                let parameter = mandatory(element, "parameter", tag)?;
                self.value = Some(AffectedValue::new(id, parameter));
            }
            Tag::Action => {
                let last_modified = mandatory(element, "last-modified", tag)?;
                let action_type: ActionType = mandatory(element, "type", tag)?.parse()?;
                let mut action = Action::new(last_modified, action_type);
                if let Some(order) = attribute(element, "order")? {
                    action.set_order(parse_integer(&order)?)?;
                }
                has_text = action_type == ActionType::CorrectValue;
                self.action = Some(action);
            }
            Tag::Algorithm => {
                let name = mandatory(element, "name", tag)?;
                let reference = attribute(element, "reference")?;
                self.algorithm = Some(Algorithm::new(name, reference.as_deref()));
            }
            Tag::Parameter => {
                self.parameter_key = Some(mandatory(element, "key", tag)?);
                has_text = true;
            }
            Tag::Product => {
                let name = mandatory(element, "name", tag)?;
                open(&mut self.product, Tag::AffectedProducts)?.add_product(name)?;
            }
            Tag::Cause
            | Tag::Description
            | Tag::Extent
            | Tag::Instrument
            | Tag::Resolution
            | Tag::Title
            | Tag::Value => has_text = true,
        }

        self.stack.push(Frame {
            tag,
            text: has_text.then(String::new),
        });
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(buffer) = self.stack.last_mut().and_then(|frame| frame.text.as_mut()) {
            buffer.push_str(text);
        }
    }

    fn end(&mut self) -> Result<()> {
        let Some(frame) = self.stack.pop() else {
            return Err(QiapError::invalid_argument("unbalanced end element"));
        };
        let text = frame.text.unwrap_or_default();
        match frame.tag {
            Tag::QualityIssueReport => {
                self.finished = Some(take(&mut self.report, frame.tag)?);
            }
            Tag::QualityIssue => {
                let issue = take(&mut self.issue, frame.tag)?;
                debug!(issue_id = issue.id(), "parsed quality issue");
                open(&mut self.report, Tag::QualityIssueReport)?.add_issue(issue)?;
            }
            Tag::AffectedProducts => {
                let product = take(&mut self.product, frame.tag)?;
                open(&mut self.issue, Tag::QualityIssue)?.add_affected_product(product);
            }
            Tag::AffectedValues => {
                let value = take(&mut self.value, frame.tag)?;
                open(&mut self.product, Tag::AffectedProducts)?.add_affected_value(value);
            }
            Tag::Action => {
                let mut action = take(&mut self.action, frame.tag)?;
                if action.action_type() == ActionType::CorrectValue {
                    action.set_correction(&text)?;
                }
                action.check_complete()?;
                match self.value.as_mut() {
                    Some(value) => value.add_action(action)?,
                    None => open(&mut self.product, Tag::AffectedProducts)?.add_action(action)?,
                }
            }
            Tag::Algorithm => {
                let algorithm = take(&mut self.algorithm, frame.tag)?;
                open(&mut self.action, Tag::Action)?.set_algorithm(algorithm)?;
            }
            Tag::Parameter => {
                let key = take(&mut self.parameter_key, frame.tag)?;
                open(&mut self.algorithm, Tag::Algorithm)?.add_parameter(key, text);
            }
            Tag::Extent => match self.value.as_mut() {
                Some(value) => value.set_extent(&text)?,
                None => open(&mut self.product, Tag::AffectedProducts)?.set_extent(&text)?,
            },
            Tag::Value => open(&mut self.value, Tag::AffectedValues)?.add_value(text)?,
            Tag::Title => open(&mut self.issue, Tag::QualityIssue)?.set_title(&text)?,
            Tag::Description => open(&mut self.issue, Tag::QualityIssue)?.set_description(&text)?,
            Tag::Instrument => open(&mut self.issue, Tag::QualityIssue)?.set_instrument(&text)?,
            Tag::Cause => open(&mut self.issue, Tag::QualityIssue)?.set_cause(&text)?,
            Tag::Resolution => open(&mut self.issue, Tag::QualityIssue)?.set_resolution(&text)?,
            Tag::Product => {}
        }
        Ok(())
    }
}
