use std::path::PathBuf;

use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};

/// Filesystem change after classification. Consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Something was created (file or directory).
    Created(PathBuf),
    /// Something was removed (file or directory).
    Removed(PathBuf),
    /// File content was written.
    Written(PathBuf),
    /// A path was renamed, either side of the rename.
    Renamed(PathBuf),
    /// The notification source reported an error.
    Error(String),
}

/// Translate a raw notify result into zero or more change events.
///
/// Access, metadata-only and unknown kinds are dropped: only create, remove,
/// write and rename are of interest.
///
/// inotify reports one rename as `From`, `To` and `Both`. The old name becomes
/// `Renamed` and the new name `Created`, so one rename is one restart at most;
/// the paired `Both` event is dropped.
pub fn classify(result: notify::Result<notify::Event>) -> Vec<ChangeEvent> {
    let event = match result {
        Ok(event) => event,
        Err(err) => return vec![ChangeEvent::Error(err.to_string())],
    };

    let make: fn(PathBuf) -> ChangeEvent = match event.kind {
        EventKind::Create(_) => ChangeEvent::Created,
        EventKind::Remove(_) => ChangeEvent::Removed,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => ChangeEvent::Written,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeEvent::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => return Vec::new(),
        EventKind::Modify(ModifyKind::Name(_)) => ChangeEvent::Renamed,
        _ => return Vec::new(),
    };

    event.paths.into_iter().map(make).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> notify::Result<notify::Event> {
        let mut event = notify::Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        Ok(event)
    }

    #[test]
    fn test_create_and_remove() {
        assert_eq!(
            classify(event(EventKind::Create(CreateKind::Folder), &["app/new"])),
            vec![ChangeEvent::Created(PathBuf::from("app/new"))]
        );
        assert_eq!(
            classify(event(EventKind::Remove(RemoveKind::Any), &["app/sub"])),
            vec![ChangeEvent::Removed(PathBuf::from("app/sub"))]
        );
    }

    #[test]
    fn test_content_write_is_written() {
        assert_eq!(
            classify(event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["app/main.go"]
            )),
            vec![ChangeEvent::Written(PathBuf::from("app/main.go"))]
        );
        assert_eq!(
            classify(event(EventKind::Modify(ModifyKind::Any), &["app/main.go"])),
            vec![ChangeEvent::Written(PathBuf::from("app/main.go"))]
        );
    }

    #[test]
    fn test_rename_source_is_renamed_and_target_is_created() {
        assert_eq!(
            classify(event(
                EventKind::Modify(ModifyKind::Name(RenameMode::From)),
                &["app/old.go"]
            )),
            vec![ChangeEvent::Renamed(PathBuf::from("app/old.go"))]
        );
        assert_eq!(
            classify(event(
                EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                &["app/new.go"]
            )),
            vec![ChangeEvent::Created(PathBuf::from("app/new.go"))]
        );
    }

    #[test]
    fn test_paired_rename_event_is_dropped() {
        let events = classify(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["app/old.go", "app/new.go"],
        ));
        assert!(events.is_empty(), "got {events:?}");
    }

    #[test]
    fn test_unpaired_rename_is_renamed() {
        assert_eq!(
            classify(event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
                &["app/main.go"]
            )),
            vec![ChangeEvent::Renamed(PathBuf::from("app/main.go"))]
        );
    }

    #[test]
    fn test_uninteresting_kinds_are_dropped() {
        assert!(classify(event(EventKind::Access(AccessKind::Any), &["a.go"])).is_empty());
        assert!(
            classify(event(
                EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
                &["a.go"]
            ))
            .is_empty()
        );
        assert!(classify(event(EventKind::Other, &["a.go"])).is_empty());
    }

    #[test]
    fn test_notify_error_becomes_error_event() {
        let events = classify(Err(notify::Error::generic("queue overflow")));
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ChangeEvent::Error(msg) if msg.contains("queue overflow")));
    }
}
