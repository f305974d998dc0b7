//! Integration tests for the escriba registry and generation pipeline.
//!
//! These tests validate:
//! - Package discovery, skipping and hot reload
//! - Payload validation and coercion through the service
//! - Markup expansion, asset resolution and PDF output
//! - The bundled demo packages end to end

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;
use serde_json::json;

use escriba::converter::{ConvertError, ConvertRequest, PdfConverter};
use escriba::pipeline;
use escriba::{DocumentService, Error, ErrorKind, FieldError, ServiceConfig, TemplateRegistry};

// =====================================================================
// Helpers
// =====================================================================

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

const INVOICE_SHAPE: &str = r#"{
  "fields": [
    { "name": "client_name", "type": "string", "required": true },
    { "name": "notes", "type": "string" }
  ]
}"#;

const INVOICE_MARKUP: &str = r#"<h1>Invoice for {{ client_name }}</h1>
{% if notes is defined %}<p class="notes">{{ notes }}</p>{% endif %}"#;

fn write_invoice(root: &Path) {
    write(root, "invoice/shape.json", INVOICE_SHAPE);
    write(root, "invoice/template.html", INVOICE_MARKUP);
    write(root, "invoice/styles.css", "h1 { color: #003366 }");
}

fn service(root: &Path) -> DocumentService {
    DocumentService::open(&ServiceConfig::with_templates_dir(root)).unwrap()
}

fn field_errors(result: escriba::Result<Vec<u8>>) -> Vec<FieldError> {
    match result {
        Err(e) => e
            .field_errors()
            .unwrap_or_else(|| panic!("expected validation error, got {e}"))
            .to_vec(),
        Ok(_) => panic!("expected validation error"),
    }
}

fn bundled_templates() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("templates")
}

/// Records the markup it was asked to convert.
#[derive(Default)]
struct CapturingConverter {
    seen: std::sync::Mutex<Vec<ConvertRequest>>,
}

impl PdfConverter for CapturingConverter {
    fn convert(&self, request: &ConvertRequest) -> Result<Vec<u8>, ConvertError> {
        self.seen.lock().unwrap().push(request.clone());
        Ok(b"%PDF-fake".to_vec())
    }
}

struct FailingConverter;

impl PdfConverter for FailingConverter {
    fn convert(&self, _request: &ConvertRequest) -> Result<Vec<u8>, ConvertError> {
        Err(ConvertError::Markup(escriba::markup::MarkupError::Unterminated {
            what: "tag",
            offset: 7,
        }))
    }
}

// =====================================================================
// Registry
// =====================================================================

#[test]
fn valid_packages_are_listed_once() {
    let root = tempfile::tempdir().unwrap();
    write_invoice(root.path());
    write(root.path(), "letter/shape.json", r#"{ "fields": [] }"#);
    write(root.path(), "letter/template.html", "<p>Dear reader</p>");
    write(root.path(), "letter/styles.css", "");

    let service = service(root.path());
    assert_eq!(service.list_templates(), vec!["invoice", "letter"]);
}

#[test]
fn malformed_shape_is_excluded_without_failing_reload() {
    let root = tempfile::tempdir().unwrap();
    write_invoice(root.path());
    write(root.path(), "broken/shape.json", r#"{ "fields": [ { "name": "x", "type": "colour" } ] }"#);
    write(root.path(), "broken/template.html", "");
    write(root.path(), "broken/styles.css", "");
    write(root.path(), "nostyle/shape.json", r#"{ "fields": [] }"#);
    write(root.path(), "nostyle/template.html", "");

    let service = service(root.path());
    let report = service.reload().unwrap();
    assert_eq!(service.list_templates(), vec!["invoice"]);

    let kinds: Vec<(String, ErrorKind)> = report
        .skipped
        .iter()
        .map(|s| (s.name.clone(), s.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("broken".to_string(), ErrorKind::InvalidShapeDefinition),
            ("nostyle".to_string(), ErrorKind::IncompleteTemplatePackage),
        ]
    );
}

#[test]
fn reload_is_idempotent() {
    let root = tempfile::tempdir().unwrap();
    write_invoice(root.path());
    let service = service(root.path());

    let first = service.snapshot();
    service.reload().unwrap();
    let second = service.snapshot();

    assert_eq!(first.names(), second.names());
    for name in first.names() {
        assert_eq!(
            first.lookup(&name).unwrap().shape().to_json(),
            second.lookup(&name).unwrap().shape().to_json()
        );
    }
    assert_eq!(second.generation(), first.generation() + 1);
}

#[test]
fn hot_reload_picks_up_new_packages() {
    let root = tempfile::tempdir().unwrap();
    let service = service(root.path());
    assert!(service.list_templates().is_empty());
    assert!(!service.registry().needs_reload().unwrap());

    write_invoice(root.path());
    assert!(service.registry().needs_reload().unwrap());
    let report = service.reload().unwrap();
    assert_eq!(report.loaded, vec!["invoice"]);
    assert_eq!(service.list_templates(), vec!["invoice"]);
}

#[test]
fn requests_keep_their_snapshot_across_reloads() {
    let root = tempfile::tempdir().unwrap();
    write_invoice(root.path());
    let service = Arc::new(service(root.path()));

    let held = service.snapshot();
    let descriptor = held.lookup("invoice").unwrap();

    fs::remove_dir_all(root.path().join("invoice")).unwrap();
    service.reload().unwrap();
    assert!(matches!(
        service.generate("invoice", &json!({ "client_name": "Acme" })),
        Err(Error::TemplateNotFound { .. })
    ));

    // The captured descriptor still renders.
    let payload = escriba::validate(descriptor.shape(), &json!({ "client_name": "Acme" })).unwrap();
    let bytes = pipeline::render(
        &descriptor,
        &payload,
        &escriba::FlowConverter::new(),
        &escriba::PageConfig::default(),
    )
    .unwrap();
    assert_valid_pdf(&bytes);
}

#[test]
fn concurrent_generation_during_reload() {
    let root = tempfile::tempdir().unwrap();
    write_invoice(root.path());
    let service = Arc::new(service(root.path()));

    let mut handles = Vec::new();
    for i in 0..4 {
        let service = Arc::clone(&service);
        handles.push(thread::spawn(move || {
            for _ in 0..3 {
                let bytes = service
                    .generate("invoice", &json!({ "client_name": format!("Client {i}") }))
                    .unwrap();
                assert_valid_pdf(&bytes);
            }
        }));
    }
    let reloader = {
        let service = Arc::clone(&service);
        thread::spawn(move || {
            for _ in 0..5 {
                service.reload().unwrap();
            }
        })
    };
    for handle in handles {
        handle.join().unwrap();
    }
    reloader.join().unwrap();
    assert_eq!(service.list_templates(), vec!["invoice"]);
}

#[test]
fn unreadable_root_is_registry_unavailable() {
    let root = tempfile::tempdir().unwrap();
    let config = ServiceConfig::with_templates_dir(root.path().join("missing"));
    let err = DocumentService::open(&config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RegistryUnavailable);
    assert_eq!(err.status_hint(), 500);

    let registry = TemplateRegistry::new(&config);
    assert!(registry.list_templates().is_empty());
}

// =====================================================================
// Validation through the service
// =====================================================================

#[test]
fn invoice_without_notes_renders_without_notes_section() {
    let root = tempfile::tempdir().unwrap();
    write_invoice(root.path());
    let config = ServiceConfig::with_templates_dir(root.path());
    let capture = Arc::new(CapturingConverter::default());

    struct Shared(Arc<CapturingConverter>);
    impl PdfConverter for Shared {
        fn convert(&self, request: &ConvertRequest) -> Result<Vec<u8>, ConvertError> {
            self.0.convert(request)
        }
    }

    let service = DocumentService::with_converter(&config, Box::new(Shared(Arc::clone(&capture)))).unwrap();
    service.generate("invoice", &json!({ "client_name": "Acme" })).unwrap();
    service
        .generate("invoice", &json!({ "client_name": "Acme", "notes": "Net 30" }))
        .unwrap();

    let seen = capture.seen.lock().unwrap();
    assert!(seen[0].markup.contains("Invoice for Acme"));
    assert!(!seen[0].markup.contains("notes"));
    assert!(seen[1].markup.contains(r#"<p class="notes">Net 30</p>"#));
}

#[test]
fn empty_payload_cites_client_name() {
    let root = tempfile::tempdir().unwrap();
    write_invoice(root.path());
    let service = service(root.path());

    let result = service.generate("invoice", &json!({}));
    assert_eq!(
        field_errors(result),
        vec![FieldError::new("client_name", "field required")]
    );
    let err = service.generate("invoice", &json!({})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);
    assert_eq!(err.status_hint(), 400);
}

#[test]
fn missing_template_is_not_found() {
    let root = tempfile::tempdir().unwrap();
    write_invoice(root.path());
    let service = service(root.path());

    let err = service.generate("missing_template", &json!({})).unwrap_err();
    assert!(matches!(err, Error::TemplateNotFound { ref name } if name == "missing_template"));
    assert_eq!(err.status_hint(), 404);
    assert!(matches!(
        service.describe("missing_template"),
        Err(Error::TemplateNotFound { .. })
    ));
}

#[test]
fn union_field_renders_identically_for_equivalent_inputs() {
    let root = tempfile::tempdir().unwrap();
    write(
        root.path(),
        "event/shape.json",
        r#"{ "fields": [ { "name": "max_attendees", "type": ["string", "integer", "number"] } ] }"#,
    );
    write(root.path(), "event/template.html", "<p>Capacity: {{ max_attendees }}</p>");
    write(root.path(), "event/styles.css", "");
    let service = service(root.path());
    let descriptor = service.registry().lookup("event").unwrap();

    let mut rendered = Vec::new();
    for raw in [json!("50"), json!(50), json!(50.0)] {
        let payload = escriba::validate(descriptor.shape(), &json!({ "max_attendees": raw })).unwrap();
        assert_eq!(payload.get("max_attendees"), Some(&escriba::Value::Integer(50)));
        let request = pipeline::prepare(&descriptor, &payload, service.page()).unwrap();
        rendered.push(request.markup);
    }
    assert_eq!(rendered[0], "<p>Capacity: 50</p>");
    assert_eq!(rendered[0], rendered[1]);
    assert_eq!(rendered[1], rendered[2]);
}

#[test]
fn nested_errors_carry_paths() {
    let root = tempfile::tempdir().unwrap();
    write(
        root.path(),
        "program/shape.json",
        r#"{ "fields": [
            { "name": "speakers", "type": "array", "required": true, "min_items": 1,
              "items": { "type": "object", "fields": [
                { "name": "name", "type": "string", "required": true, "min_length": 1 }
              ] } }
        ] }"#,
    );
    write(root.path(), "program/template.html", "");
    write(root.path(), "program/styles.css", "");
    let service = service(root.path());

    let errors = field_errors(service.generate(
        "program",
        &json!({ "speakers": [ { "name": "Ada" }, { "name": "" }, {} ] }),
    ));
    assert_eq!(
        errors,
        vec![
            FieldError::new("speakers[1].name", "must be at least 1 characters"),
            FieldError::new("speakers[2].name", "field required"),
        ]
    );
}

#[test]
fn schema_example_payload_validates() {
    let service = service(&bundled_templates());
    for name in service.list_templates() {
        let schema = service.schema(&name).unwrap();
        assert_eq!(schema.template, name);
        let shape = service.describe(&name).unwrap();
        let payload = escriba::validate(&shape, &schema.payload)
            .unwrap_or_else(|e| panic!("example for '{name}' does not validate: {e}"));
        for field in &schema.required {
            assert!(payload.is_present(field), "{name}: {field}");
        }
    }
}

// =====================================================================
// Rendering
// =====================================================================

#[test]
fn missing_asset_is_asset_not_found() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "logo/shape.json", r#"{ "fields": [] }"#);
    write(root.path(), "logo/template.html", r#"<img src="img/logo.png"><p>x</p>"#);
    write(root.path(), "logo/styles.css", "");
    let service = service(root.path());

    let err = service.generate("logo", &json!({})).unwrap_err();
    match err {
        Error::AssetNotFound { template, reference } => {
            assert_eq!(template, "logo");
            assert_eq!(reference, "img/logo.png");
        }
        other => panic!("expected AssetNotFound, got {other:?}"),
    }
}

#[test]
fn stylesheet_references_are_checked() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "bg/shape.json", r#"{ "fields": [] }"#);
    write(root.path(), "bg/template.html", "<p>x</p>");
    write(root.path(), "bg/styles.css", "body { background: url(../outside.png) }");
    let service = service(root.path());

    assert!(matches!(
        service.generate("bg", &json!({})),
        Err(Error::AssetNotFound { ref reference, .. }) if reference == "../outside.png"
    ));
}

#[test]
fn external_and_resolved_assets() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "web/shape.json", r#"{ "fields": [] }"#);
    write(
        root.path(),
        "web/template.html",
        r#"<link rel="stylesheet" href="css/extra.css"><img src="https://example.com/a.png"><p>x</p>"#,
    );
    write(root.path(), "web/styles.css", "");
    write(root.path(), "web/css/extra.css", "p { font-weight: bold }");
    let service = service(root.path());
    let descriptor = service.registry().lookup("web").unwrap();
    let payload = escriba::validate(descriptor.shape(), &json!({})).unwrap();

    let request = pipeline::prepare(&descriptor, &payload, service.page()).unwrap();
    let resolved: Vec<&str> = request.assets.iter().map(|(r, _)| r).collect();
    assert_eq!(resolved, vec!["css/extra.css"]);
    assert_valid_pdf(&service.generate("web", &json!({})).unwrap());
}

#[test]
fn converter_failure_is_render_failed() {
    let root = tempfile::tempdir().unwrap();
    write_invoice(root.path());
    let config = ServiceConfig::with_templates_dir(root.path());
    let service = DocumentService::with_converter(&config, Box::new(FailingConverter)).unwrap();

    let err = service.generate("invoice", &json!({ "client_name": "Acme" })).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RenderFailed);
    assert!(err.to_string().contains("unterminated tag"), "{err}");
}

#[test]
fn broken_stylesheet_is_render_failed() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "bad/shape.json", r#"{ "fields": [] }"#);
    write(root.path(), "bad/template.html", "<p>x</p>");
    write(root.path(), "bad/styles.css", "p { color: red");
    let service = service(root.path());

    let err = service.generate("bad", &json!({})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RenderFailed);
}

#[test]
fn template_runtime_error_is_render_failed() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "strict/shape.json", r#"{ "fields": [ { "name": "who", "type": "string" } ] }"#);
    write(root.path(), "strict/template.html", "<p>{{ who }}</p>");
    write(root.path(), "strict/styles.css", "");
    let service = service(root.path());

    // `who` is optional, so an absent value is undefined in the markup.
    let err = service.generate("strict", &json!({})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RenderFailed);
    assert_valid_pdf(&service.generate("strict", &json!({ "who": "me" })).unwrap());
}

#[test]
fn null_is_defined_but_falsy() {
    let root = tempfile::tempdir().unwrap();
    write(
        root.path(),
        "memo/shape.json",
        r#"{ "fields": [ { "name": "cc", "type": "string", "nullable": true } ] }"#,
    );
    write(
        root.path(),
        "memo/template.html",
        "{% if cc is defined %}defined{% if cc %} truthy{% endif %}{% else %}absent{% endif %}",
    );
    write(root.path(), "memo/styles.css", "");
    let service = service(root.path());
    let descriptor = service.registry().lookup("memo").unwrap();

    let expand = |raw: serde_json::Value| {
        let payload = escriba::validate(descriptor.shape(), &raw).unwrap();
        pipeline::prepare(&descriptor, &payload, service.page()).unwrap().markup
    };
    assert_eq!(expand(json!({})), "absent");
    assert_eq!(expand(json!({ "cc": null })), "defined");
    assert_eq!(expand(json!({ "cc": "ops" })), "defined truthy");
}

#[test]
fn landscape_pages_are_wider_than_tall() {
    let root = tempfile::tempdir().unwrap();
    write_invoice(root.path());
    let mut config = ServiceConfig::with_templates_dir(root.path());
    config.page.orientation = escriba::PageOrientation::Landscape;
    let service = DocumentService::open(&config).unwrap();
    assert!(service.page().effective_width() > service.page().effective_height());
    assert_valid_pdf(&service.generate("invoice", &json!({ "client_name": "Acme" })).unwrap());
}

#[test]
fn default_stylesheet_fills_in() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "plain/shape.json", r#"{ "fields": [] }"#);
    write(root.path(), "plain/template.html", "<p>plain</p>");
    let shared = root.path().join("shared.css");
    fs::write(&shared, "p { color: #333333 }").unwrap();

    let mut config = ServiceConfig::with_templates_dir(root.path());
    config.default_stylesheet = Some(shared);
    let service = DocumentService::open(&config).unwrap();
    assert_eq!(service.list_templates(), vec!["plain"]);
    assert_valid_pdf(&service.generate("plain", &json!({})).unwrap());
}

#[test]
fn default_stylesheet_assets_resolve_beside_it() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "plain/shape.json", r#"{ "fields": [] }"#);
    write(root.path(), "plain/template.html", r#"<p class="brand">plain</p>"#);

    let shared = tempfile::tempdir().unwrap();
    write(
        shared.path(),
        "css/default.css",
        "@font-face { font-family: Sen; src: url(../fonts/sen.woff2) format('woff2') }\n\
         .brand { font-family: Sen, sans-serif; background: url('../img/bg.png?v=3') }",
    );
    write(shared.path(), "fonts/sen.woff2", "wOF2");
    write(shared.path(), "img/bg.png", "not decoded");

    let mut config = ServiceConfig::with_templates_dir(root.path());
    config.default_stylesheet = Some(shared.path().join("css/default.css"));
    let service = DocumentService::open(&config).unwrap();
    assert_valid_pdf(&service.generate("plain", &json!({})).unwrap());

    let descriptor = service.registry().lookup("plain").unwrap();
    let payload = escriba::validate(descriptor.shape(), &json!({})).unwrap();
    let request = pipeline::prepare(&descriptor, &payload, service.page()).unwrap();
    let font = request.assets.get("../fonts/sen.woff2").unwrap();
    assert!(font.ends_with("fonts/sen.woff2"), "{}", font.display());
}

#[test]
fn default_stylesheet_missing_asset_is_asset_not_found() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "plain/shape.json", r#"{ "fields": [] }"#);
    write(root.path(), "plain/template.html", "<p>plain</p>");
    let shared = tempfile::tempdir().unwrap();
    write(
        shared.path(),
        "css/default.css",
        "@font-face { font-family: Sen; src: url(../fonts/missing.woff2) }",
    );

    let mut config = ServiceConfig::with_templates_dir(root.path());
    config.default_stylesheet = Some(shared.path().join("css/default.css"));
    let service = DocumentService::open(&config).unwrap();
    assert!(matches!(
        service.generate("plain", &json!({})),
        Err(Error::AssetNotFound { ref reference, .. }) if reference == "../fonts/missing.woff2"
    ));
}

#[test]
fn non_ascii_text_and_attributes_render() {
    let root = tempfile::tempdir().unwrap();
    write(
        root.path(),
        "letter/shape.json",
        r#"{ "fields": [
            { "name": "name", "type": "string", "required": true },
            { "name": "color", "type": "string", "required": true }
        ] }"#,
    );
    write(
        root.path(),
        "letter/template.html",
        r#"<h1 style="color: {{ color }}">Señor {{ name }}</h1>
<ul><li>Straße – 5 €</li><li>“quoted” … 中文</li></ul>
<table><tr><td>Ærø</td><td>ñandú</td></tr></table>"#,
    );
    write(root.path(), "letter/styles.css", "h1 { border-color: #ééé; color: #zzz }");
    let service = service(root.path());

    for color in ["#a\u{e9}\u{e9}a", "#336699", "caf\u{e9}"] {
        let bytes = service
            .generate("letter", &json!({ "name": "Zoë Ñúñez", "color": color }))
            .unwrap_or_else(|e| panic!("color {color:?}: {e}"));
        assert_valid_pdf(&bytes);
    }
}

#[test]
fn example_payloads_with_tight_bounds_validate() {
    let root = tempfile::tempdir().unwrap();
    write(
        root.path(),
        "bounds/shape.json",
        r#"{ "closed": true, "fields": [
            { "name": "ratio", "type": "number", "exclusive_minimum": 0, "exclusive_maximum": 0.5, "required": true },
            { "name": "balance", "type": "integer", "maximum": -0.5, "required": true },
            { "name": "tier", "type": "string", "choices": ["ab", "abcd"], "min_length": 3, "required": true },
            { "name": "lines", "type": "array", "min_items": 2, "required": true,
              "items": { "type": "object", "fields": [
                  { "name": "qty", "type": "integer", "minimum": 1.5, "exclusive_maximum": 3, "required": true }
              ] } }
        ] }"#,
    );
    write(root.path(), "bounds/template.html", "<p>{{ ratio }} {{ balance }} {{ tier }}</p>");
    write(root.path(), "bounds/styles.css", "");
    let service = service(root.path());

    let schema = service.schema("bounds").unwrap();
    assert_eq!(schema.payload["tier"], json!("abcd"));
    assert_eq!(schema.payload["lines"][1]["qty"], json!(2));
    let shape = service.describe("bounds").unwrap();
    escriba::validate(&shape, &schema.payload).unwrap();
    assert_valid_pdf(&service.generate("bounds", &schema.payload).unwrap());
}

// =====================================================================
// Bundled demo packages
// =====================================================================

#[test]
fn bundled_packages_load() {
    let service = service(&bundled_templates());
    assert_eq!(service.list_templates(), vec!["example_template", "invoice"]);
    assert!(service.snapshot().skipped().is_empty());
}

#[test]
fn bundled_invoice_scenarios() {
    let service = service(&bundled_templates());

    let bytes = service
        .generate(
            "invoice",
            &json!({
                "client_name": "Acme",
                "invoice_number": 1042,
                "items": [
                    { "label": "Consulting", "quantity": "3", "unit_price": 120 },
                    { "label": "Travel", "quantity": 1, "unit_price": 85.5 }
                ],
                "notes": null
            }),
        )
        .unwrap();
    assert_valid_pdf(&bytes);

    assert_eq!(
        field_errors(service.generate("invoice", &json!({}))),
        vec![FieldError::new("client_name", "field required")]
    );
    assert_eq!(
        field_errors(service.generate(
            "invoice",
            &json!({ "client_name": "Acme", "items": [ { "label": "x", "quantity": 1, "unit_price": 1, "sku": "A" } ] })
        )),
        vec![FieldError::new("items[0].sku", "unexpected field")]
    );
}

#[test]
fn bundled_conference_program_renders() {
    let service = service(&bundled_templates());
    let payload = json!({
        "document_title": "TechConf 2025 Program",
        "document_security_level": "Public",
        "event_name": "TechConf 2025: Future of AI & Cloud Computing",
        "event_date": "March 15-17, 2025",
        "event_location": "San Francisco Convention Center, CA",
        "event_description": "Three days of talks, workshops and networking.",
        "max_attendees": "500",
        "speakers": [
            { "name": "Dr. Sarah Chen", "title": "Chief AI Officer", "company": "DataMind Technologies" },
            { "name": "Marcus Johnson", "title": "VP of Cloud Architecture", "company": "CloudScale Systems",
              "bio": "Leads cloud infrastructure teams." }
        ],
        "sessions": [
            { "time": "09:00 - 10:00", "title": "The Future of Artificial Intelligence",
              "speaker_name": "Dr. Sarah Chen", "location": "Main Hall", "duration_minutes": 60,
              "is_keynote": true },
            { "time": "10:30 - 11:30", "title": "Building Scalable Cloud Infrastructure",
              "speaker_name": "Marcus Johnson", "location": "Room A", "duration_minutes": "60" }
        ],
        "sponsors": [ { "name": "Acme Cloud", "level": "Gold" } ],
        "wifi_ssid": "TechConf-Guest",
        "contact_email": "info@techconf.example.com"
    });
    assert_valid_pdf(&service.generate("example_template", &payload).unwrap());

    let errors = field_errors(service.generate(
        "example_template",
        &json!({
            "event_name": "X", "event_date": "Y", "event_location": "Z", "event_description": "W",
            "speakers": [],
            "sessions": [ { "time": "t", "title": "t", "speaker_name": "s", "location": "l",
                            "duration_minutes": 0, "is_keynote": "yes" } ]
        }),
    ));
    let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["speakers", "sessions[0].duration_minutes", "sessions[0].is_keynote"]
    );
}
