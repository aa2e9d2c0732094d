use application::index::{load_and_embed, EmbeddingIndex, DEFAULT_BATCH_SIZE};
use application::rag_service::RagService;
use domain::error::{ChainError, IndexError, IngestionError};
use domain::models::{Document, Role};
use infrastructure::file_scanner::FileScanner;
use infrastructure::search::SimilarityMetric;
use presentation::cli::{run_session, SessionStats};
use presentation::formatter::format_response;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tests::{FlakyEmbedder, HashEmbedder, ScriptedGenerator};

fn md() -> Vec<String> {
    vec![".md".to_string()]
}

fn write_vault(dir: &Path) {
    fs::write(dir.join("todo.md"), "# Today\n- [ ] buy milk\n- [x] call mom\n").unwrap();
    fs::create_dir_all(dir.join("projects")).unwrap();
    fs::write(dir.join("projects/garden.md"), "Plan raised beds and order tomato seeds.").unwrap();
    fs::write(dir.join("reading.md"), "Finish the book about distributed systems.").unwrap();
}

#[tokio::test]
async fn todo_question_sees_open_and_done_tasks_and_answer_is_passed_through() {
    let tmp = TempDir::new().unwrap();
    write_vault(tmp.path());

    let embedder = HashEmbedder::new();
    let scanner = FileScanner::new(tmp.path(), &md());
    let index = load_and_embed(&scanner, &embedder, DEFAULT_BATCH_SIZE, SimilarityMetric::Cosine).await.unwrap();
    assert_eq!(index.len(), 3);

    let answer = "You still need to buy milk.";
    let service = RagService::new(index, embedder, ScriptedGenerator::answering(answer));
    let response = service.answer("what do I need to do?").await.unwrap();

    assert!(response
        .source_paths()
        .iter()
        .any(|p| p.ends_with("todo.md")));

    let prompts = service.generator().prompts();
    assert_eq!(prompts.len(), 1);
    let system = &prompts[0][0];
    assert_eq!(system.role, Role::System);
    assert!(system.content.contains("- [ ] buy milk"));
    assert!(system.content.contains("- [x] call mom"));
    assert_eq!(prompts[0][1].content, "what do I need to do?");

    assert_eq!(format_response(&response), format!("Response: {answer}\n"));
}

#[tokio::test]
async fn directory_without_markdown_fails_before_embedding() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("notes.txt"), "- [ ] buy milk").unwrap();

    let embedder = HashEmbedder::new();
    let scanner = FileScanner::new(tmp.path(), &md());
    let err = load_and_embed(&scanner, &embedder, DEFAULT_BATCH_SIZE, SimilarityMetric::Cosine)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IndexError::Ingestion(IngestionError::NoDocuments { .. })
    ));
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn top_k_larger_than_corpus_returns_every_note() {
    let embedder = HashEmbedder::new();
    let docs = vec![
        Document::new("a.md", "alpha note"),
        Document::new("b.md", "beta note"),
    ];
    let index = EmbeddingIndex::build(&embedder, docs, DEFAULT_BATCH_SIZE).await.unwrap();

    let result = index.search(&embedder, "note", 5).await.unwrap();
    assert_eq!(result.len(), 2);
}

#[tokio::test]
async fn failed_query_does_not_end_the_session() {
    let embedder = FlakyEmbedder::failing_on("unreachable");
    let docs = vec![
        Document::new("todo.md", "- [ ] buy milk"),
        Document::new("garden.md", "water the tomatoes"),
    ];
    let service = RagService::from_documents(docs, embedder, ScriptedGenerator::answering("buy milk"), 4)
        .await
        .unwrap();

    let err = service.answer("this one is unreachable").await.unwrap_err();
    assert!(matches!(err, ChainError::Retrieval(_)));
    assert!(service.answer("what is left to do?").await.is_ok());

    let mut source: VecDeque<String> = ["unreachable query", "what is left to do?", "EXIT"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut out = Vec::new();
    let stats = run_session(&service, &mut source, &mut out, false).await.unwrap();

    assert_eq!(stats, SessionStats { answered: 1, failed: 1 });
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Error executing query"));
    assert!(text.contains("Response: buy milk"));
    assert!(text.contains("Goodbye!"));
}

#[tokio::test]
async fn generation_failure_is_reported_per_query() {
    let generator = ScriptedGenerator::answering("fine").failing_on("crash");
    let docs = vec![Document::new("todo.md", "- [ ] buy milk")];
    let service = RagService::from_documents(docs, HashEmbedder::new(), generator, 4)
        .await
        .unwrap();

    let err = service.answer("please crash").await.unwrap_err();
    assert!(matches!(err, ChainError::Generation(_)));
    assert!(err.to_string().contains("HTTP 500"));

    let ok = service.answer("what now?").await.unwrap();
    assert_eq!(ok.answer, "fine");
}

#[tokio::test]
async fn retrieval_respects_k_order_and_uniqueness() {
    let embedder = HashEmbedder::new();
    let texts = [
        "buy milk and eggs",
        "call the dentist tomorrow",
        "water tomato plants",
        "renew passport before summer",
        "read chapter three of the novel",
        "fix the bike tyre",
    ];
    let mut docs: Vec<Document> = texts
        .iter()
        .enumerate()
        .map(|(i, t)| Document::new(format!("note-{i}.md"), *t))
        .collect();
    docs.push(Document::new("note-0.md", "duplicate path is dropped"));

    let index = EmbeddingIndex::build(&embedder, docs, 4).await.unwrap();
    assert_eq!(index.len(), texts.len());

    for k in [1, 3, 6, 10] {
        let result = index.search(&embedder, "water tomato plants", k).await.unwrap();
        assert!(result.len() <= k);
        assert_eq!(result.len(), k.min(texts.len()));

        let scores = result.scores();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));

        let paths: HashSet<&str> = result.documents().map(Document::source_path).collect();
        assert_eq!(paths.len(), result.len());

        assert_eq!(result.hits()[0].document.source_path(), "note-2.md");
    }
}
