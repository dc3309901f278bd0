use amboss_normalize::{inject_coverage, process_bundle, IdentifierMap, NormalizeOptions};
use serde_json::{json, Value};

fn patient_entry(id: &str) -> Value {
    json!({
        "fullUrl": format!("urn:uuid:{id}"),
        "resource": {
            "resourceType": "Patient",
            "id": id,
            "identifier": [{ "value": id }]
        },
        "request": { "method": "POST", "url": "Patient" }
    })
}

fn eob_entry(id: &str) -> Value {
    json!({
        "fullUrl": format!("urn:uuid:{id}"),
        "resource": {
            "resourceType": "ExplanationOfBenefit",
            "id": id,
            "status": "active"
        },
        "request": { "method": "POST", "url": "ExplanationOfBenefit" }
    })
}

#[test]
fn coverage_is_inserted_before_each_claim_and_wired_back() {
    let mut bundle = json!({
        "resourceType": "Bundle",
        "type": "transaction",
        "entry": [patient_entry("P1"), eob_entry("eob-1")]
    });

    inject_coverage(&mut bundle, "org-1");

    let entries = bundle["entry"].as_array().unwrap();
    assert_eq!(entries.len(), 3);

    let coverage = &entries[1]["resource"];
    assert_eq!(coverage["resourceType"], "Coverage");
    assert_eq!(coverage["status"], "active");
    assert_eq!(coverage["beneficiary"]["reference"], "Patient/P1");
    assert_eq!(coverage["payor"][0]["reference"], "Organization/org-1");
    assert_eq!(entries[1]["request"]["method"], "POST");
    assert_eq!(entries[1]["request"]["url"], "Coverage");

    let coverage_id = coverage["id"].as_str().unwrap();
    assert_eq!(
        entries[1]["fullUrl"].as_str().unwrap(),
        format!("urn:uuid:{coverage_id}")
    );

    let insurance = &entries[2]["resource"]["insurance"];
    assert_eq!(insurance[0]["focal"], true);
    assert_eq!(
        insurance[0]["coverage"]["reference"].as_str().unwrap(),
        format!("Coverage/{coverage_id}")
    );
}

#[test]
fn each_claim_gets_its_own_coverage() {
    let mut bundle = json!({
        "resourceType": "Bundle",
        "entry": [patient_entry("P1"), eob_entry("eob-1"), eob_entry("eob-2")]
    });

    inject_coverage(&mut bundle, "org-1");

    let entries = bundle["entry"].as_array().unwrap();
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[1]["resource"]["resourceType"], "Coverage");
    assert_eq!(entries[3]["resource"]["resourceType"], "Coverage");
    assert_ne!(entries[1]["resource"]["id"], entries[3]["resource"]["id"]);
    assert_eq!(
        entries[2]["resource"]["insurance"][0]["coverage"]["reference"]
            .as_str()
            .unwrap(),
        format!("Coverage/{}", entries[1]["resource"]["id"].as_str().unwrap())
    );
    assert_eq!(
        entries[4]["resource"]["insurance"][0]["coverage"]["reference"]
            .as_str()
            .unwrap(),
        format!("Coverage/{}", entries[3]["resource"]["id"].as_str().unwrap())
    );
}

#[test]
fn prior_insurance_on_a_claim_is_overwritten() {
    let mut bundle = json!({
        "resourceType": "Bundle",
        "entry": [
            patient_entry("P1"),
            {
                "resource": {
                    "resourceType": "ExplanationOfBenefit",
                    "id": "eob-1",
                    "insurance": [{ "coverage": { "reference": "Coverage/stale" } }]
                }
            }
        ]
    });

    inject_coverage(&mut bundle, "org-1");

    let insurance = &bundle["entry"][2]["resource"]["insurance"];
    assert_eq!(insurance.as_array().unwrap().len(), 1);
    assert_eq!(insurance[0]["focal"], true);
    assert_ne!(insurance[0]["coverage"]["reference"], "Coverage/stale");
}

#[test]
fn bundle_without_a_patient_is_left_untouched() {
    let mut bundle = json!({
        "resourceType": "Bundle",
        "entry": [eob_entry("eob-1")]
    });
    let before = bundle.clone();

    inject_coverage(&mut bundle, "org-1");
    assert_eq!(bundle, before);
}

#[test]
fn non_bundle_documents_are_ignored() {
    let mut document = json!({ "resourceType": "Patient", "id": "P1" });
    let before = document.clone();

    inject_coverage(&mut document, "org-1");
    assert_eq!(document, before);
}

#[test]
fn processed_bundle_keeps_coverage_linkage_canonical() {
    let bundle = json!({
        "resourceType": "Bundle",
        "type": "transaction",
        "entry": [patient_entry("P1"), eob_entry("eob-1")]
    });

    let out = process_bundle(bundle, &IdentifierMap::new(), &NormalizeOptions::default());
    let entries = out["entry"].as_array().unwrap();
    assert_eq!(entries.len(), 3);

    let coverage = &entries[1]["resource"];
    assert_eq!(coverage["resourceType"], "Coverage");
    // Patient id P1 is indexed through the patient's own identifier, so the
    // beneficiary survives the rewrite in canonical form.
    assert_eq!(coverage["beneficiary"]["reference"], "Patient/P1");

    let coverage_id = coverage["id"].as_str().unwrap();
    assert_eq!(
        entries[2]["resource"]["insurance"][0]["coverage"]["reference"]
            .as_str()
            .unwrap(),
        format!("Coverage/{coverage_id}")
    );
}
