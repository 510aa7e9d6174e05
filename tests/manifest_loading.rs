use std::io::Write;

use rulegate::error::ManifestValidationError;
use rulegate::manifest::{DomainManifest, Operator, SeverityClass};

const KYC: &str = r#"{
    "domain_id": "KYC",
    "domain_name": "Know your customer",
    "version": "3.0",
    "entities": ["age", "document", "risk"],
    "constraints": [
        {"id": "ADULT", "entity": "age", "operator": "GTE", "value": 18, "severity": "fatal"},
        {"id": "DOC", "entity": "document", "operator": "REQUIRED", "conditional_on": null},
        {"id": "RISK", "entity": "risk", "operator": "LT", "value": 0.7, "severity": "WARNING",
         "weight": 2.5, "conditional_on": ["ADULT", "DOC"], "temporal_window": "30d"}
    ]
}"#;

#[test]
fn manifest_loads_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(KYC.as_bytes()).unwrap();

    let manifest = DomainManifest::from_path(file.path()).unwrap();
    assert_eq!(manifest.domain_id(), "KYC");
    assert_eq!(manifest.constraints().len(), 3);
    assert!(manifest.has_temporal_rules());
    assert!(!manifest.is_flat());

    let risk = manifest.constraint("RISK").unwrap();
    assert_eq!(risk.operator(), Operator::Lt);
    assert_eq!(risk.severity(), SeverityClass::Warning);
    assert_eq!(risk.window_seconds(), Some(30.0 * 86_400.0));
    assert_eq!(manifest.constraint("ADULT").unwrap().severity(), SeverityClass::Critical);

    let from_str = DomainManifest::from_json_str(KYC).unwrap();
    assert_eq!(manifest.fingerprint(), from_str.fingerprint());
}

#[test]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = DomainManifest::from_path(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ManifestValidationError::Malformed { .. }));
}

#[test]
fn validation_errors_name_the_rule() {
    let undeclared = KYC.replace(r#""entity": "risk""#, r#""entity": "credit""#);
    let err = DomainManifest::from_json_str(&undeclared).unwrap_err();
    assert_eq!(err.rule_id(), Some("RISK"));
    assert_eq!(err.to_string(), "Constraint RISK uses undefined entity: credit");

    let cyclic = KYC.replace(r#""conditional_on": null"#, r#""conditional_on": ["RISK"]"#);
    assert!(matches!(
        DomainManifest::from_json_str(&cyclic).unwrap_err(),
        ManifestValidationError::DependencyCycle { .. }
    ));

    let bad_shape = KYC.replace(r#""value": 0.7"#, r#""value": [0.7]"#);
    assert!(matches!(
        DomainManifest::from_json_str(&bad_shape).unwrap_err(),
        ManifestValidationError::OperatorValueMismatch { .. }
    ));
}
