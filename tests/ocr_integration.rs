use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use structured_llm::llm::{
    Completion, ContentBlock, GenerationRequest, GenerationService, StopReason, Usage,
};
use structured_llm::ocr::{self, DocumentAnalyzer, OcrMode, PageOutput};
use structured_llm::Error;
use tempfile::TempDir;

struct PageService {
    reply: String,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl PageService {
    fn replying(reply: &str) -> Self {
        Self {
            reply: reply.into(),
            requests: Mutex::default(),
        }
    }
}

#[async_trait]
impl GenerationService for PageService {
    async fn generate(&self, request: &GenerationRequest) -> structured_llm::Result<Completion> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(Completion {
            content: vec![ContentBlock::Text {
                text: self.reply.clone(),
            }],
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        })
    }
}

fn write_pages(dir: &Path, names: &[&str]) {
    for name in names {
        fs::write(dir.join(name), [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
    }
}

const ANALYSIS: &str = r##"{
    "file_type": "invoice",
    "file_content_md": "# Invoice 42\n\n| item | price |",
    "file_elements": [
        {"element_type": "header", "element_content": "Invoice 42"},
        {"element_type": "table", "element_content": "| item | price |"}
    ]
}"##;

#[test]
fn list_files_filters_and_sorts() {
    let tmp = TempDir::new().unwrap();
    write_pages(tmp.path(), &["doc_page_1.jpg", "doc_page_0.jpg", "notes.txt"]);
    fs::create_dir(tmp.path().join("nested")).unwrap();
    write_pages(&tmp.path().join("nested"), &["deep.jpg"]);

    let files = ocr::list_files(tmp.path(), ".jpg").unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["doc_page_0.jpg", "doc_page_1.jpg"]);

    assert!(matches!(
        ocr::list_files(&tmp.path().join("missing"), "jpg"),
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn structured_pages_are_validated_and_saved() {
    let tmp = TempDir::new().unwrap();
    write_pages(tmp.path(), &["doc_page_0.jpg", "doc_page_1.jpg"]);
    let pages = ocr::list_files(tmp.path(), "jpg").unwrap();

    let service = PageService::replying(ANALYSIS);
    let analyzer = DocumentAnalyzer::new(&service, OcrMode::Structured).with_max_in_flight(1);
    let outputs = analyzer.analyze_pages(&pages).await.unwrap();

    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].filename(), "doc_page_0");
    assert_eq!(outputs[1].filename(), "doc_page_1");
    let PageOutput::Structured {
        analysis_result, ..
    } = &outputs[0]
    else {
        panic!("expected structured output");
    };
    assert_eq!(analysis_result.file_type, "invoice");
    assert_eq!(analysis_result.file_elements.len(), 2);

    let requests = service.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    let request = &requests[0];
    assert_eq!(request.output.as_ref().unwrap().name, "page_analysis");
    assert_eq!(request.settings.unwrap().temperature, Some(0.0));
    let ContentBlock::Image { media_type, data } = &request.messages[0].content[1] else {
        panic!("expected an image block");
    };
    assert_eq!(media_type, "image/jpeg");
    assert_eq!(data, "/9j/4A==");

    let out_dir = tmp.path().join("results");
    let path = analyzer.save_results("doc", &outputs, &out_dir).unwrap();
    assert_eq!(path, out_dir.join("structured_doc.json"));
    let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["source"], "doc");
    assert!(saved["analyzed_at"].is_string());
    assert_eq!(saved["pages"][1]["filename"], "doc_page_1");
    assert_eq!(
        saved["pages"][0]["analysis_result"]["file_elements"][1]["element_type"],
        "table"
    );
}

#[tokio::test]
async fn malformed_elements_fail_the_page() {
    let tmp = TempDir::new().unwrap();
    write_pages(tmp.path(), &["doc_page_0.png"]);

    let service = PageService::replying(
        r##"{"file_type": "invoice", "file_content_md": "# Invoice", "file_elements": ["No elements found"]}"##,
    );
    let analyzer = DocumentAnalyzer::new(&service, OcrMode::Structured);
    let err = analyzer
        .analyze_page(&tmp.path().join("doc_page_0.png"))
        .await
        .unwrap_err();
    assert_eq!(err.violations()[0].field, "file_elements[0]");
}

#[tokio::test]
async fn basic_mode_keeps_markdown_text() {
    let tmp = TempDir::new().unwrap();
    write_pages(tmp.path(), &["scan.jpg"]);

    let service = PageService::replying("# Heading\n\nSome paragraph.");
    let analyzer = DocumentAnalyzer::new(&service, OcrMode::Basic);
    let output = analyzer
        .analyze_page(&tmp.path().join("scan.jpg"))
        .await
        .unwrap();
    assert_eq!(
        output,
        PageOutput::Basic {
            filename: "scan".into(),
            result: "# Heading\n\nSome paragraph.".into(),
        }
    );
    assert!(service.requests.lock().unwrap()[0].output.is_none());

    let path = analyzer
        .save_results("scan", &[output], tmp.path())
        .unwrap();
    assert_eq!(path.file_name().unwrap(), "scan.json");
}

#[tokio::test]
async fn unsupported_page_fails_before_any_request() {
    let tmp = TempDir::new().unwrap();
    let pdf = tmp.path().join("doc.pdf");
    fs::write(&pdf, b"%PDF-1.7").unwrap();

    let service = PageService::replying(ANALYSIS);
    let analyzer = DocumentAnalyzer::new(&service, OcrMode::Structured);
    let err = analyzer.analyze_pages(&[pdf]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(service.requests.lock().unwrap().is_empty());
}
