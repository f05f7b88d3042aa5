//! End-to-End QIAP Demo
//!
//! Demonstrates the full pipeline:
//! 1. Parsing a Quality Issue Report
//! 2. Attaching the matching rule set to an opened product
//! 3. Reads that are corrected, discarded or passed through
//!
//! Run with: cargo run --example qiap_demo (set RUST_LOG=debug to see rule decisions)

use qiap_engine::QiapContext;
use qiap_model::{DataType, NativeType, Node, Product};
use qiap_report::parse_report;
use tracing_subscriber::EnvFilter;

const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<qi:QualityIssueReport xmlns:qi="http://geca.esa.int/qiap/issue/2008/07" organisation="ESA">
  <qi:QualityIssue id="1" last-modified="2008-07-01" mission="ENVISAT">
    <qi:Title>Radiometric offset</qi:Title>
    <qi:Description>Gain stored with a wrong exponent; last samples saturated.</qi:Description>
    <qi:AffectedProducts id="10" product_type="MER_RR__1P">
      <qi:Extent>str(/mph/software_version) &lt; 'MERIS/5.02'</qi:Extent>
      <qi:AffectedValues id="100" parameter="/gain">
        <qi:Action last-modified="2008-07-01" type="correct value">1.02</qi:Action>
      </qi:AffectedValues>
      <qi:AffectedValues id="101" parameter="/radiance[]">
        <qi:Extent>index() &gt;= 3</qi:Extent>
        <qi:Action last-modified="2008-07-01" type="discard value"/>
      </qi:AffectedValues>
    </qi:AffectedProducts>
  </qi:QualityIssue>
</qi:QualityIssueReport>
"#;

fn product(software_version: &str) -> Product {
    let ty = DataType::record(vec![
        ("gain", DataType::real(NativeType::Double)),
        ("radiance", DataType::array(DataType::integer(NativeType::UInt16))),
        (
            "mph",
            DataType::record(vec![("software_version", DataType::text())]),
        ),
    ]);
    let root = Node::record(vec![
        Node::real(102.0),
        Node::array((0..5).map(|v| Node::uint(1000 + v)).collect()),
        Node::record(vec![Node::text(software_version)]),
    ]);
    Product::new("/archive/MER_RR__1PNPDK20080701.N1", ty, root)
        .with_class("ENVISAT")
        .with_product_type("MER_RR__1P")
}

fn show(product: &Product) {
    let mut cursor = product.cursor();
    match cursor.goto("/gain").and_then(|_| cursor.read_double()) {
        Ok(gain) => println!("    gain          = {gain}"),
        Err(err) => println!("    gain          : {err}"),
    }
    for i in 0..5 {
        let mut cursor = product.cursor();
        let path = format!("/radiance[{i}]");
        match cursor.goto(&path).and_then(|_| cursor.read_uint16()) {
            Ok(value) => println!("    radiance[{i}]   = {value}"),
            Err(err) if err.is_discard() => println!("    radiance[{i}]   : discarded ({err})"),
            Err(err) => println!("    radiance[{i}]   : error {err}"),
        }
    }
}

fn main() -> qiap_error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║           QIAP END-TO-END DEMO                               ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    // ========================================================================
    // Step 1: Load the report
    // ========================================================================

    println!("━━━ Step 1: Loading Quality Issue Report ━━━");
    let report = parse_report(REPORT)?;
    let summary = report.summary();
    println!(
        "  {} issue(s), {} affected value(s), {} correction(s), {} discard(s)",
        summary.issues, summary.affected_values, summary.correct_value, summary.discard_value
    );
    let context = QiapContext::from_report(report);
    println!();

    // ========================================================================
    // Step 2: Affected product
    // ========================================================================

    println!("━━━ Step 2: Product processed with MERIS/4.10 ━━━");
    let mut old = product("MERIS/4.10");
    println!("  rule set attached: {}", context.attach(&mut old)?);
    show(&old);
    println!();

    // ========================================================================
    // Step 3: Product outside the extent
    // ========================================================================

    println!("━━━ Step 3: Product processed with MERIS/5.02 ━━━");
    let mut new = product("MERIS/5.02");
    println!("  rule set attached: {}", context.attach(&mut new)?);
    show(&new);
    println!();

    // ========================================================================
    // Step 4: Interception switched off
    // ========================================================================

    println!("━━━ Step 4: Interception disabled at runtime ━━━");
    context.set_enabled(false);
    show(&old);

    Ok(())
}
