use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use spillway::config::Tuning;
use spillway::display::StatusState;
use spillway::runner::{ProcessRunner, RunSpec};
use spillway::sanitize::strip_ansi;
use spillway::testing::{RecordingSink, RecordingStatus};

fn temp_workspace(name: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    let root = std::env::temp_dir().join(format!("spillway-search-{name}-{ts}"));
    fs::create_dir_all(&root).expect("mkdir workspace");
    root
}

fn sh(script: &str, cwd: &Path) -> RunSpec {
    RunSpec::new("sh", vec!["-c".to_owned(), script.to_owned()], cwd)
}

fn completed_runner(script: &str, name: &str) -> (ProcessRunner, RecordingSink, RecordingStatus) {
    let cwd = temp_workspace(name);
    let mut runner = ProcessRunner::new(Tuning::default());
    let mut sink = RecordingSink::new();
    let mut status = RecordingStatus::new();
    runner.run(sh(script, &cwd), &mut sink, &mut status);
    let deadline = Instant::now() + Duration::from_secs(10);
    while runner.is_busy() && Instant::now() < deadline {
        runner.pump(Duration::from_millis(20), &mut sink, &mut status);
    }
    assert!(!runner.is_busy(), "runner did not settle in time");
    (runner, sink, status)
}

fn last_search_message(status: &RecordingStatus) -> Option<&str> {
    status
        .updates
        .iter()
        .rev()
        .find(|(state, _)| *state == StatusState::Search)
        .map(|(_, message)| message.as_str())
}

#[test]
fn search_finds_case_insensitive_matches_in_order() {
    let (mut runner, mut sink, mut status) =
        completed_runner("printf 'hello foo\\nbar\\nFOO bar\\n'", "case-insensitive");

    runner.search("foo", &mut sink, &mut status);
    assert!(runner.is_search_active());

    let view = strip_ansi(sink.contents.last().expect("results view"));
    assert!(view.contains("Search: \"foo\"  in 3 buffered lines"));
    assert!(view.contains("1: hello foo"));
    assert!(view.contains("3: FOO bar"));
    assert!(!view.contains("2: bar"));
    assert!(view.contains("2 matches"));
    // Cursor starts unselected: no search status yet
    assert_eq!(last_search_message(&status), None);
}

#[test]
fn navigation_selects_then_wraps() {
    let (mut runner, mut sink, mut status) =
        completed_runner("printf 'hello foo\\nbar\\nFOO bar\\n'", "navigation");

    runner.search("foo", &mut sink, &mut status);

    runner.search_navigate(1, &mut sink, &mut status);
    assert!(last_search_message(&status)
        .expect("search status")
        .starts_with("Match 1/2  line 1"));

    runner.search_navigate(1, &mut sink, &mut status);
    assert!(last_search_message(&status)
        .expect("search status")
        .starts_with("Match 2/2  line 3"));

    runner.search_navigate(1, &mut sink, &mut status);
    assert!(last_search_message(&status)
        .expect("search status")
        .starts_with("Match 1/2  line 1"));

    let view = strip_ansi(sink.contents.last().expect("results view"));
    assert!(view.contains(">>>"));
}

#[test]
fn zero_match_search_is_active_but_inert() {
    let (mut runner, mut sink, mut status) =
        completed_runner("printf 'alpha\\nbeta\\n'", "zero-match");

    runner.search("zzz", &mut sink, &mut status);
    assert!(runner.is_search_active(), "zero matches still count as searched");

    let view = strip_ansi(sink.contents.last().expect("results view"));
    assert!(view.contains("No matches found"));

    let before = sink.contents.len();
    runner.search_navigate(1, &mut sink, &mut status);
    assert_eq!(sink.contents.len(), before, "navigation is a no-op");
    assert_eq!(last_search_message(&status), None);
}

#[test]
fn searching_an_empty_buffer_reports_nothing_to_search() {
    let mut runner = ProcessRunner::new(Tuning::default());
    let mut sink = RecordingSink::new();
    let mut status = RecordingStatus::new();

    runner.search("anything", &mut sink, &mut status);
    assert!(!runner.is_search_active());
    let view = strip_ansi(sink.contents.last().expect("notice"));
    assert!(view.contains("No output to search."));
}

#[test]
fn empty_query_is_a_noop() {
    let (mut runner, mut sink, mut status) = completed_runner("printf 'alpha\\n'", "empty-query");

    let before = sink.contents.len();
    runner.search("", &mut sink, &mut status);
    assert!(!runner.is_search_active());
    assert_eq!(sink.contents.len(), before);
}

#[test]
fn clearing_search_restores_the_full_transcript() {
    let (mut runner, mut sink, mut status) =
        completed_runner("printf 'hello foo\\nbar\\n'", "clear");

    runner.search("foo", &mut sink, &mut status);
    assert!(runner.is_search_active());

    runner.search_clear(&mut sink);
    assert!(!runner.is_search_active());

    let restored = sink.contents.last().expect("restored content");
    assert_eq!(restored, &runner.buffer_lines().join("\n"));
    assert_eq!(sink.scrolls.last(), Some(&100));
}

#[test]
fn new_run_invalidates_the_search_session() {
    let (mut runner, mut sink, mut status) =
        completed_runner("printf 'hello foo\\n'", "invalidate");

    runner.search("foo", &mut sink, &mut status);
    assert!(runner.is_search_active());

    let cwd = temp_workspace("invalidate-second");
    runner.run(sh("echo fresh", &cwd), &mut sink, &mut status);
    assert!(!runner.is_search_active(), "a new run clears the session");
}
