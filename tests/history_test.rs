use codex_memory::history::HistoryLog;

#[test]
fn concurrent_logs_share_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.db");

    let a = HistoryLog::open(&path).unwrap();
    let b = HistoryLog::open(&path).unwrap();
    a.append("from a", "r", &[], 3).unwrap();
    b.append("from b", "r", &[], 3).unwrap();
    a.append("from a again", "r", &[], 4).unwrap();

    assert_eq!(a.count().unwrap(), 3);
    let prompts: Vec<String> = b.recent(10).unwrap().into_iter().map(|r| r.prompt).collect();
    assert_eq!(prompts, vec!["from a again", "from b", "from a"]);
}

#[test]
fn reads_rows_written_with_epoch_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.db");

    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT, prompt TEXT, response TEXT, tags TEXT, tokens INTEGER
            );
            INSERT INTO history (ts, prompt, response, tags, tokens)
            VALUES ('1700000000', 'old prompt', 'old response', '[]', 4);",
        )
        .unwrap();
    }

    let log = HistoryLog::open(&path).unwrap();
    log.append("new prompt", "new response", &["x".into()], 4).unwrap();

    let records = log.recent(10).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].prompt, "old prompt");
    assert_eq!(records[1].timestamp.timestamp(), 1_700_000_000);
    assert_eq!(records[0].tags, vec!["x".to_string()]);
}

#[test]
fn open_fails_on_unwritable_location() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let err = HistoryLog::open(blocker.join("history.db")).err().unwrap();
    assert!(matches!(err, codex_memory::Error::History(_)));
}
