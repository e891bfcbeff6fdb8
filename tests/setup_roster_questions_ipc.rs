mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn setup_defaults_and_validated_updates() {
    let workspace = temp_dir("classroomd-setup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let no_ws = request(&mut stdin, &mut reader, "0", "setup.get", json!({}));
    assert_eq!(error_code(&no_ws), Some("no_workspace"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let setup = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(setup["roster"]["emailMatch"], json!("case_insensitive"));
    assert_eq!(setup["roster"]["defaultActive"], json!(true));
    assert_eq!(setup["questions"]["allocationMethod"], json!("independent_rounding"));
    assert_eq!(setup["questions"]["fallbackTopicTag"], json!("grammar"));
    assert_eq!(setup["questions"]["maxQuestionCount"], json!(200));

    for (id, section, patch) in [
        ("3", "roster", json!({ "emailMatch": "fuzzy" })),
        ("4", "roster", json!({ "nickname": true })),
        ("5", "questions", json!({ "maxQuestionCount": 0 })),
        ("6", "questions", json!({ "fallbackTopicTag": "  " })),
        ("7", "grades", json!({})),
    ] {
        let bad = request(
            &mut stdin,
            &mut reader,
            id,
            "setup.update",
            json!({ "section": section, "patch": patch }),
        );
        assert_eq!(error_code(&bad), Some("bad_params"), "{}", bad);
    }

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "setup.update",
        json!({ "section": "questions", "patch": { "allocationMethod": "LARGEST_REMAINDER", "maxQuestionCount": 20 } }),
    );
    let setup = request_ok(&mut stdin, &mut reader, "9", "setup.get", json!({}));
    assert_eq!(setup["questions"]["allocationMethod"], json!("largest_remainder"));
    assert_eq!(setup["questions"]["maxQuestionCount"], json!(20));
}

#[test]
fn exact_email_match_setting_changes_identity() {
    let workspace = temp_dir("classroomd-setup-email-match");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({ "section": "roster", "patch": { "emailMatch": "exact", "defaultActive": false } }),
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "roster.apply",
        json!({ "text": "name,email\nAlice,a@x.com" }),
    );
    assert_eq!(first["emailMatch"], json!("exact"));
    assert_eq!(first["created"], json!(1));

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "roster.apply",
        json!({ "text": "name,email\nAlice,A@x.com\nAlice,a@x.com" }),
    );
    assert_eq!(second["created"], json!(1));
    assert_eq!(second["updated"], json!(1));

    let students = request_ok(&mut stdin, &mut reader, "5", "students.list", json!({}));
    let list = students["students"].as_array().expect("students array");
    assert_eq!(list.len(), 2);
    assert!(list.iter().all(|s| s["isActive"] == json!(false)));
}

#[test]
fn questions_allocate_and_generate_over_ipc() {
    let workspace = temp_dir("classroomd-questions");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let ratio = json!({ "multipleChoice": 70, "shortAnswer": 20, "descriptive": 10 });
    let alloc = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "questions.allocate",
        json!({ "targetQuestionCount": 10, "questionTypeRatio": ratio }),
    );
    assert_eq!(
        alloc["counts"],
        json!({ "multipleChoice": 7, "shortAnswer": 2, "descriptive": 1 })
    );
    assert_eq!(alloc["drift"], json!(0));

    let drift = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "questions.allocate",
        json!({
            "targetQuestionCount": 2,
            "questionTypeRatio": { "multipleChoice": 50, "shortAnswer": 25, "descriptive": 25 }
        }),
    );
    assert_eq!(drift["total"], json!(3));
    assert_eq!(drift["drift"], json!(1));

    let exact = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "questions.allocate",
        json!({
            "targetQuestionCount": 2,
            "questionTypeRatio": { "multipleChoice": 50, "shortAnswer": 25, "descriptive": 25 },
            "allocationMethod": "largest_remainder"
        }),
    );
    assert_eq!(exact["total"], json!(2));

    for (id, params) in [
        ("4", json!({ "targetQuestionCount": 10, "questionTypeRatio": { "multipleChoice": 70, "shortAnswer": 20, "descriptive": 20 } })),
        ("5", json!({ "targetQuestionCount": 0, "questionTypeRatio": ratio })),
        ("6", json!({ "targetQuestionCount": -3, "questionTypeRatio": ratio })),
        ("7", json!({ "targetQuestionCount": 10 })),
        ("8", json!({ "targetQuestionCount": 10, "questionTypeRatio": ratio, "allocationMethod": "dhondt" })),
    ] {
        let bad = request(&mut stdin, &mut reader, id, "questions.generate", params);
        assert_eq!(error_code(&bad), Some("bad_params"), "{}", bad);
    }

    let generated = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "questions.generate",
        json!({ "targetQuestionCount": 10, "questionTypeRatio": ratio, "topicTags": [] }),
    );
    let questions = generated["questions"].as_array().expect("questions array");
    assert_eq!(questions.len(), 10);
    assert_eq!(generated["topicTags"], json!(["grammar"]));
    assert_eq!(questions[0]["type"], json!("multipleChoice"));
    assert_eq!(questions[0]["options"].as_array().map(|o| o.len()), Some(4));
    assert_eq!(questions[0]["options"][0]["isCorrect"], json!(true));
    assert_eq!(questions[7]["type"], json!("shortAnswer"));
    assert!(questions[7]["sampleAnswer"].is_string());
    assert!(questions[7].get("options").is_none());
    assert_eq!(questions[9]["type"], json!("descriptive"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let unit = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "units.create",
        json!({ "title": "Narrative", "topics": ["plot", "setting", "plot", " "] }),
    );
    assert_eq!(unit["topics"], json!(["plot", "setting"]));
    let unit_id = unit["unitId"].as_str().expect("unit id").to_string();

    let params = json!({
        "targetQuestionCount": 4,
        "questionTypeRatio": { "multipleChoice": 100, "shortAnswer": 0, "descriptive": 0 },
        "unitId": unit_id
    });
    let a = request_ok(&mut stdin, &mut reader, "12", "questions.generate", params.clone());
    let b = request_ok(&mut stdin, &mut reader, "13", "questions.generate", params);
    assert_eq!(a, b);
    let tags = a["questions"]
        .as_array()
        .expect("questions array")
        .iter()
        .map(|q| q["conceptTags"][0].as_str().unwrap_or("").to_string())
        .collect::<Vec<_>>();
    assert_eq!(tags, vec!["plot", "setting", "plot", "setting"]);

    let missing_unit = request(
        &mut stdin,
        &mut reader,
        "14",
        "questions.generate",
        json!({ "targetQuestionCount": 4, "questionTypeRatio": ratio, "unitId": "nope" }),
    );
    assert_eq!(error_code(&missing_unit), Some("not_found"));

    // Repeated tags weight the rotation; they are cycled exactly as supplied.
    let weighted = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "questions.generate",
        json!({
            "targetQuestionCount": 3,
            "questionTypeRatio": { "multipleChoice": 100, "shortAnswer": 0, "descriptive": 0 },
            "topicTags": ["verbs", "verbs", "nouns"]
        }),
    );
    assert_eq!(weighted["topicTags"], json!(["verbs", "verbs", "nouns"]));
    let tags = weighted["questions"]
        .as_array()
        .expect("questions array")
        .iter()
        .map(|q| q["conceptTags"][0].as_str().unwrap_or("").to_string())
        .collect::<Vec<_>>();
    assert_eq!(tags, vec!["verbs", "verbs", "nouns"]);
}
