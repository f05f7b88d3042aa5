//! Which affected-product entry of a quality issue applies to a product.

use crate::guard::SuppressGuard;
use qiap_error::{QiapError, Result};
use qiap_model::Product;
use qiap_report::{AffectedProduct, QualityIssue};
use tracing::debug;

/// Find the affected-product entry of `issue` that applies to `product`.
///
/// The product needs both a class and a type. The issue's mission must be a
/// prefix of the product class. Only the first entry with a matching product
/// type is considered; it applies when its extent holds at the product root,
/// when the product's base filename is listed, or unconditionally when it
/// has neither.
pub fn find_affected_product<'r>(
    product: &Product,
    issue: &'r QualityIssue,
) -> Result<Option<&'r AffectedProduct>> {
    let (Some(class), Some(product_type)) = (product.class(), product.product_type()) else {
        return Ok(None);
    };
    if !class.starts_with(issue.mission()) {
        return Ok(None);
    }
    let Some(affected) = issue
        .affected_products()
        .iter()
        .find(|affected| affected.product_type() == product_type)
    else {
        return Ok(None);
    };

    let applies = if let Some(extent) = affected.extent() {
        let _guard = SuppressGuard::enter();
        extent
            .eval_bool(&product.cursor())
            .map_err(|source| QiapError::ExtentEvaluation {
                issue_id: issue.id(),
                affected_product_id: affected.id(),
                affected_value_id: None,
                source: Box::new(source),
            })?
    } else if !affected.products().is_empty() {
        let name = product.base_filename();
        affected.products().iter().any(|listed| listed == name)
    } else {
        true
    };

    debug!(
        issue_id = issue.id(),
        affected_product_id = affected.id(),
        applies,
        "resolved affected product"
    );
    Ok(applies.then_some(affected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::is_suppressed;
    use qiap_error::ErrorKind;
    use qiap_model::{DataType, NativeType, Node};

    fn product(class: Option<&str>, product_type: Option<&str>) -> Product {
        let ty = DataType::record(vec![("version", DataType::integer(NativeType::Int32))]);
        let mut product = Product::new("/archive/MER_RR__2PNPDK2008.N1", ty, Node::record(vec![Node::int(3)]));
        if let Some(class) = class {
            product = product.with_class(class);
        }
        if let Some(product_type) = product_type {
            product = product.with_product_type(product_type);
        }
        product
    }

    fn issue(products: Vec<AffectedProduct>) -> QualityIssue {
        let mut issue = QualityIssue::new(11, "2008-07-01", "ENVISAT");
        for product in products {
            issue.add_affected_product(product);
        }
        issue
    }

    #[test]
    fn test_class_and_type_required() {
        let issue = issue(vec![AffectedProduct::new(1, "MER_RR__2P")]);
        assert!(find_affected_product(&product(None, Some("MER_RR__2P")), &issue).unwrap().is_none());
        assert!(find_affected_product(&product(Some("ENVISAT_MERIS"), None), &issue).unwrap().is_none());
        let found = find_affected_product(&product(Some("ENVISAT_MERIS"), Some("MER_RR__2P")), &issue).unwrap();
        assert_eq!(found.map(AffectedProduct::id), Some(1));
    }

    #[test]
    fn test_mission_is_class_prefix() {
        let issue = issue(vec![AffectedProduct::new(1, "MER_RR__2P")]);
        let other = product(Some("ERS"), Some("MER_RR__2P"));
        assert!(find_affected_product(&other, &issue).unwrap().is_none());
    }

    #[test]
    fn test_filename_list() {
        let mut listed = AffectedProduct::new(1, "MER_RR__2P");
        listed.add_product("MER_RR__2PNPDK2008.N1").unwrap();
        let issue_listed = issue(vec![listed]);
        let product = product(Some("ENVISAT"), Some("MER_RR__2P"));
        assert!(find_affected_product(&product, &issue_listed).unwrap().is_some());

        let mut other = AffectedProduct::new(1, "MER_RR__2P");
        other.add_product("mer_rr__2pnpdk2008.n1").unwrap();
        let issue_other = issue(vec![other]);
        assert!(find_affected_product(&product, &issue_other).unwrap().is_none());
    }

    #[test]
    fn test_extent_decides_and_only_first_type_match_counts() {
        let mut never = AffectedProduct::new(1, "MER_RR__2P");
        never.set_extent("int(/version) > 5").unwrap();
        let always = AffectedProduct::new(2, "MER_RR__2P");
        let issue = issue(vec![never, always]);
        let product = product(Some("ENVISAT"), Some("MER_RR__2P"));
        assert!(find_affected_product(&product, &issue).unwrap().is_none());
        assert!(!is_suppressed());
    }

    #[test]
    fn test_extent_error_is_wrapped_and_guard_released() {
        let mut broken = AffectedProduct::new(4, "MER_RR__2P");
        broken.set_extent("int(/missing) > 5").unwrap();
        let issue = issue(vec![broken]);
        let product = product(Some("ENVISAT"), Some("MER_RR__2P"));
        let err = find_affected_product(&product, &issue).unwrap_err();
        assert!(matches!(err, QiapError::ExtentEvaluation { issue_id: 11, affected_product_id: 4, .. }));
        assert_eq!(err.kind(), ErrorKind::Data);
        assert!(!is_suppressed());
    }
}
