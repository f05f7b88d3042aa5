//! Quality Issue Report writer.
//!
//! Emits the same document shape the reader accepts, indented by two spaces.
//! Optional elements and attributes are only written when set, so reading the
//! output back yields an equivalent report.

use crate::action::{Action, ActionType};
use crate::issue::{AffectedProduct, AffectedValue, QualityIssue, Report};
use crate::NAMESPACE;
use qiap_error::{QiapError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;
use std::path::Path;

type XmlResult = std::result::Result<(), quick_xml::Error>;

/// Serialize `report` into `out`.
pub fn write_report<W: Write>(report: &Report, out: W) -> Result<()> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);
    emit_report(&mut writer, report).map_err(|err| {
        QiapError::io(
            "failed to write Quality Issue Report",
            std::io::Error::other(err.to_string()),
        )
    })?;
    writer
        .into_inner()
        .write_all(b"\n")
        .map_err(|err| QiapError::io("failed to write Quality Issue Report", err))
}

pub fn report_to_string(report: &Report) -> Result<String> {
    let mut buffer = Vec::new();
    write_report(report, &mut buffer)?;
    String::from_utf8(buffer).map_err(|err| QiapError::data(err.to_string()))
}

/// Write `report` to a file, replacing any existing content.
pub fn write_report_file(report: &Report, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path).map_err(|err| {
        QiapError::io(
            format!("failed to create Quality Issue Report file '{}'", path.display()),
            err,
        )
    })?;
    write_report(report, std::io::BufWriter::new(file))?;
    tracing::info!(path = %path.display(), "wrote quality issue report");
    Ok(())
}

// ============================================================================
// Element emitters
// ============================================================================

fn qualified(local: &str) -> String {
    format!("qi:{local}")
}

fn text_element<W: Write>(writer: &mut Writer<W>, local: &str, text: &str) -> XmlResult {
    let name = qualified(local);
    writer.write_event(Event::Start(BytesStart::new(name.as_str())))?;
    // An explicit (possibly empty) text event keeps the indenter from
    // inserting whitespace into the element content.
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name.as_str())))
}

fn optional_text_element<W: Write>(
    writer: &mut Writer<W>,
    local: &str,
    text: Option<&str>,
) -> XmlResult {
    match text {
        Some(text) => text_element(writer, local, text),
        None => Ok(()),
    }
}

fn emit_report<W: Write>(writer: &mut Writer<W>, report: &Report) -> XmlResult {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let name = qualified("QualityIssueReport");
    let mut root = BytesStart::new(name.as_str());
    root.push_attribute(("xmlns:qi", NAMESPACE));
    root.push_attribute(("organisation", report.organisation()));
    writer.write_event(Event::Start(root))?;
    for issue in report.issues() {
        emit_issue(writer, issue)?;
    }
    writer.write_event(Event::End(BytesEnd::new(name.as_str())))
}

fn emit_issue<W: Write>(writer: &mut Writer<W>, issue: &QualityIssue) -> XmlResult {
    let name = qualified("QualityIssue");
    let id = issue.id().to_string();
    let mut start = BytesStart::new(name.as_str());
    start.push_attribute(("id", id.as_str()));
    start.push_attribute(("last-modified", issue.last_modified()));
    start.push_attribute(("mission", issue.mission()));
    writer.write_event(Event::Start(start))?;

    optional_text_element(writer, "Title", issue.title())?;
    optional_text_element(writer, "Description", issue.description())?;
    optional_text_element(writer, "Instrument", issue.instrument())?;
    optional_text_element(writer, "Cause", issue.cause())?;
    optional_text_element(writer, "Resolution", issue.resolution())?;
    for product in issue.affected_products() {
        emit_affected_product(writer, product)?;
    }

    writer.write_event(Event::End(BytesEnd::new(name.as_str())))
}

fn emit_affected_product<W: Write>(writer: &mut Writer<W>, product: &AffectedProduct) -> XmlResult {
    let name = qualified("AffectedProducts");
    let id = product.id().to_string();
    let mut start = BytesStart::new(name.as_str());
    start.push_attribute(("id", id.as_str()));
    start.push_attribute(("product_type", product.product_type()));
    writer.write_event(Event::Start(start))?;

    if let Some(extent) = product.extent() {
        text_element(writer, "Extent", extent.text())?;
    }
    let product_name = qualified("Product");
    for filename in product.products() {
        let mut element = BytesStart::new(product_name.as_str());
        element.push_attribute(("name", filename.as_str()));
        writer.write_event(Event::Empty(element))?;
    }
    for value in product.affected_values() {
        emit_affected_value(writer, value)?;
    }
    for action in product.actions() {
        emit_action(writer, action)?;
    }

    writer.write_event(Event::End(BytesEnd::new(name.as_str())))
}

fn emit_affected_value<W: Write>(writer: &mut Writer<W>, value: &AffectedValue) -> XmlResult {
    let name = qualified("AffectedValues");
    let id = value.id().to_string();
    let mut start = BytesStart::new(name.as_str());
    start.push_attribute(("id", id.as_str()));
    start.push_attribute(("parameter", value.parameter()));
    writer.write_event(Event::Start(start))?;

    if let Some(extent) = value.extent() {
        text_element(writer, "Extent", extent.text())?;
    }
    for path in value.values() {
        text_element(writer, "Value", path)?;
    }
    for action in value.actions() {
        emit_action(writer, action)?;
    }

    writer.write_event(Event::End(BytesEnd::new(name.as_str())))
}

fn emit_action<W: Write>(writer: &mut Writer<W>, action: &Action) -> XmlResult {
    let name = qualified("Action");
    let order = action.explicit_order().map(|order| order.to_string());
    let mut start = BytesStart::new(name.as_str());
    start.push_attribute(("last-modified", action.last_modified()));
    start.push_attribute(("type", action.action_type().name()));
    if let Some(order) = &order {
        start.push_attribute(("order", order.as_str()));
    }

    match action.action_type() {
        ActionType::DiscardProduct | ActionType::DiscardValue => {
            writer.write_event(Event::Empty(start))
        }
        ActionType::CorrectValue => {
            let text = action.correction().map(|c| c.text()).unwrap_or_default();
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::new(text)))?;
            writer.write_event(Event::End(BytesEnd::new(name.as_str())))
        }
        ActionType::CustomCorrection => {
            writer.write_event(Event::Start(start))?;
            if let Some(algorithm) = action.algorithm() {
                let algorithm_name = qualified("Algorithm");
                let mut element = BytesStart::new(algorithm_name.as_str());
                element.push_attribute(("name", algorithm.name()));
                if let Some(reference) = algorithm.reference() {
                    element.push_attribute(("reference", reference));
                }
                if algorithm.parameters().is_empty() {
                    writer.write_event(Event::Empty(element))?;
                } else {
                    writer.write_event(Event::Start(element))?;
                    let parameter_name = qualified("Parameter");
                    for (key, value) in algorithm.parameters() {
                        let mut parameter = BytesStart::new(parameter_name.as_str());
                        parameter.push_attribute(("key", key.as_str()));
                        writer.write_event(Event::Start(parameter))?;
                        writer.write_event(Event::Text(BytesText::new(value)))?;
                        writer.write_event(Event::End(BytesEnd::new(parameter_name.as_str())))?;
                    }
                    writer.write_event(Event::End(BytesEnd::new(algorithm_name.as_str())))?;
                }
            }
            writer.write_event(Event::End(BytesEnd::new(name.as_str())))
        }
    }
}
