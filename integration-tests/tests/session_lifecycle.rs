//! End-to-end session lifecycle scenarios.

mod common;

use anyhow::Result;
use common::{Fixture, FixtureOptions, LockedRemover, POLL, drain, wait_for};
use ephemera_kernel::cleanup::{CleanupStep, StepOutcome};
use ephemera_kernel::isolation::{BackendKind, PrivilegedCommand, SimulatedExecutor, UserFolder};
use ephemera_kernel::session::{SessionStatus, StartError, StartOutcome, StopOutcome};
use ephemera_kernel::ws::SessionEvent;
use std::fs;
use std::sync::Arc;

// =============================================================================
// Start
// =============================================================================

#[tokio::test]
async fn test_written_file_appears_in_inventory() -> Result<()> {
    let fx = Fixture::new()?;
    let manager = fx.manager();
    let mut events = manager.broadcaster().subscribe();

    assert_eq!(manager.start_session().await?, StartOutcome::Started);
    let written = fx.drop_file(UserFolder::Documents, "note.txt", b"0123456789")?;

    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::InventoryChanged { files } if !files.is_empty())
    })
    .await?;

    let inventory = manager.current_inventory();
    assert_eq!(inventory.len(), 1);
    let file = inventory.get(1).ok_or_else(|| anyhow::anyhow!("id 1 missing"))?;
    assert_eq!(file.name, "note.txt");
    assert_eq!(file.size_bytes, 10);
    assert_eq!(file.folder, UserFolder::Documents);
    assert_eq!(file.absolute_path, written);
    assert!(!fx.home().join("Documents/note.txt").exists());

    manager.stop_session().await?;
    Ok(())
}

#[tokio::test]
async fn test_second_start_reports_already_active() -> Result<()> {
    let fx = Fixture::new()?;
    let manager = fx.manager();

    assert_eq!(manager.start_session().await?, StartOutcome::Started);
    let before = manager.session();

    assert_eq!(manager.start_session().await?, StartOutcome::AlreadyActive);
    let after = manager.session();

    assert_eq!(after.id, before.id);
    assert_eq!(after.redirected_paths, before.redirected_paths);
    assert_eq!(after.redirected_paths, UserFolder::ALL.to_vec());
    assert_eq!(manager.mount_records().len(), UserFolder::ALL.len());

    manager.stop_session().await?;
    Ok(())
}

#[tokio::test]
async fn test_concurrent_starts_yield_one_session() -> Result<()> {
    let fx = Fixture::new()?;
    let manager = Arc::clone(fx.manager());

    let (a, b) = tokio::join!(manager.start_session(), manager.start_session());
    let outcomes = [a?, b?];

    assert_eq!(
        outcomes.iter().filter(|o| **o == StartOutcome::Started).count(),
        1
    );
    assert_eq!(manager.status(), SessionStatus::Active);

    manager.stop_session().await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_redirect_rolls_back_every_folder() -> Result<()> {
    let fx = Fixture::with(FixtureOptions {
        executor: SimulatedExecutor::new().fail_redirect_of(UserFolder::Music),
        ..FixtureOptions::default()
    })?;
    let manager = fx.manager();
    let mut events = manager.broadcaster().subscribe();

    let err = manager.start_session().await.unwrap_err();

    assert!(matches!(err, StartError::Redirect { folder: UserFolder::Music, .. }));
    assert!(err.unrestored().is_empty());
    assert_eq!(manager.status(), SessionStatus::Failed);
    assert!(manager.mount_records().is_empty());
    for folder in UserFolder::ALL {
        assert!(!fx.home().join(format!("{}.secure", folder.dir_name())).exists());
    }
    assert!(!fx.dir.path().join("root/upper/Documents").exists());

    let event = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::SessionStartFailed { .. })
    })
    .await?;
    assert!(matches!(
        event,
        SessionEvent::SessionStartFailed { folder: Some(ref f), .. } if f == "Music"
    ));
    Ok(())
}

#[tokio::test]
async fn test_junction_session_round_trip() -> Result<()> {
    let fx = Fixture::with(FixtureOptions {
        backend: BackendKind::Junction,
        ..FixtureOptions::default()
    })?;
    let manager = fx.manager();
    fs::write(fx.home().join("Pictures/holiday.png"), b"png")?;

    manager.start_session().await?;
    assert!(fx.home().join("Pictures.backup/holiday.png").is_file());
    fs::write(fx.home().join("Pictures/session.png"), b"tmp")?;

    manager.stop_session().await?;

    assert!(fx.home().join("Pictures/holiday.png").is_file());
    assert!(!fx.home().join("Pictures/session.png").exists());
    assert!(!fx.home().join("Pictures.backup").exists());
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_stop_leaves_user_links_outside_the_session_alone() -> Result<()> {
    let fx = Fixture::with(FixtureOptions {
        backend: BackendKind::Junction,
        folders: vec![UserFolder::Documents],
        ..FixtureOptions::default()
    })?;
    let other_drive = fx.dir.path().join("D_drive_Desktop");
    fs::create_dir_all(&other_drive)?;
    let desktop = fx.home().join("Desktop");
    fs::remove_dir(&desktop)?;
    std::os::unix::fs::symlink(&other_drive, &desktop)?;

    fx.manager().start_session().await?;
    fx.manager().stop_session().await?;

    assert_eq!(fs::read_link(&desktop)?, other_drive);
    assert!(fx.home().join("Documents").is_dir());
    assert!(!fx.home().join("Documents").is_symlink());
    Ok(())
}

#[tokio::test]
async fn test_panicking_capture_rolls_back_redirects() -> Result<()> {
    let fx = Fixture::with(FixtureOptions {
        backend: BackendKind::Junction,
        executor: SimulatedExecutor::new().fail_when("unreachable", |c| {
            assert!(
                !matches!(c, PrivilegedCommand::ExportRegistry { .. }),
                "registry export crashed"
            );
            false
        }),
        ..FixtureOptions::default()
    })?;
    let manager = fx.manager();
    fs::write(fx.home().join("Pictures/holiday.png"), b"png")?;

    let err = manager.start_session().await.unwrap_err();

    assert!(matches!(err, StartError::Aborted { .. }));
    assert!(err.unrestored().is_empty());
    assert_eq!(manager.status(), SessionStatus::Failed);
    assert!(manager.mount_records().is_empty());
    assert!(fx.home().join("Pictures/holiday.png").is_file());
    assert!(!fx.home().join("Pictures").is_symlink());
    assert!(!fx.home().join("Pictures.backup").exists());
    Ok(())
}

// =============================================================================
// Stop
// =============================================================================

#[tokio::test]
async fn test_stop_restores_snapshot_and_purges_temp() -> Result<()> {
    let fx = Fixture::new()?;
    let manager = fx.manager();
    let user_dirs = fx.home().join(".config/user-dirs.dirs");
    let original = fs::read_to_string(&user_dirs)?;

    manager.start_session().await?;
    fs::write(&user_dirs, "XDG_DOCUMENTS_DIR=\"/elsewhere\"\n")?;
    fs::write(fx.dir.path().join("tmp/download.part"), b"partial")?;
    fs::write(fx.home().join("recently-used.xbel"), "<xbel><bookmark/></xbel>")?;

    let StopOutcome::Completed(report) = manager.stop_session().await? else {
        anyhow::bail!("expected a cleanup report");
    };

    assert_eq!(report.warning_count(), 0, "{:?}", report.warnings());
    assert_eq!(fs::read_to_string(&user_dirs)?, original);
    assert!(!fx.dir.path().join("tmp/download.part").exists());
    assert!(
        !fs::read_to_string(fx.home().join("recently-used.xbel"))?.contains("bookmark")
    );
    assert_eq!(manager.status(), SessionStatus::Idle);
    assert!(manager.current_inventory().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_locked_browser_file_becomes_warning() -> Result<()> {
    let fx = Fixture::with(FixtureOptions {
        remover: Arc::new(LockedRemover {
            needle: "chrome".into(),
        }),
        ..FixtureOptions::default()
    })?;
    let manager = fx.manager();
    let mut events = manager.broadcaster().subscribe();

    manager.start_session().await?;
    fs::write(fx.dir.path().join("browsers/chrome/Default/History"), b"h")?;
    fs::write(fx.dir.path().join("browsers/firefox/abc.default/places.sqlite"), b"p")?;
    fs::write(fx.dir.path().join("tmp/scratch.txt"), b"s")?;

    let StopOutcome::Completed(report) = manager.stop_session().await? else {
        anyhow::bail!("expected a cleanup report");
    };

    assert_eq!(report.summary(), "completed with 1 warning");
    assert!(report.warnings()[0].starts_with("browser scrub (Chrome)"));
    assert_eq!(
        report.outcome_of(&CleanupStep::BrowserScrub("Firefox".into())),
        Some(&StepOutcome::Succeeded)
    );
    assert_eq!(
        report.outcome_of(&CleanupStep::SnapshotRestore),
        Some(&StepOutcome::Succeeded)
    );
    assert_eq!(
        report.outcome_of(&CleanupStep::TempPurge(fx.dir.path().join("tmp"))),
        Some(&StepOutcome::Succeeded)
    );
    assert!(!fx.dir.path().join("tmp/scratch.txt").exists());
    assert!(fx.dir.path().join("browsers/chrome/Default/History").exists());
    assert_eq!(manager.status(), SessionStatus::Idle);

    let event = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::CleanupCompleted { .. })
    })
    .await?;
    let SessionEvent::CleanupCompleted { summary, warnings } = event else {
        unreachable!();
    };
    assert_eq!(summary, "completed with 1 warning");
    assert!(warnings[0].contains("Chrome"));
    Ok(())
}

#[tokio::test]
async fn test_stop_after_failed_start_leaves_no_mounts() -> Result<()> {
    let fx = Fixture::with(FixtureOptions {
        executor: SimulatedExecutor::new().fail_redirect_of(UserFolder::Videos),
        ..FixtureOptions::default()
    })?;
    let manager = fx.manager();

    assert!(manager.start_session().await.is_err());
    assert_eq!(manager.status(), SessionStatus::Failed);

    manager.stop_session().await?;

    assert_eq!(manager.status(), SessionStatus::Idle);
    assert!(manager.mount_records().iter().all(|r| !r.is_active()));
    Ok(())
}

#[tokio::test]
async fn test_stop_when_idle_is_not_running() -> Result<()> {
    let fx = Fixture::new()?;
    assert_eq!(fx.manager().stop_session().await?, StopOutcome::NotRunning);
    Ok(())
}

// =============================================================================
// Notifications
// =============================================================================

#[tokio::test]
async fn test_no_inventory_notification_after_stop() -> Result<()> {
    let fx = Fixture::new()?;
    let manager = fx.manager();

    manager.start_session().await?;
    fx.drop_file(UserFolder::Downloads, "setup.exe", b"MZ")?;
    let mut inventory = manager.subscribe_inventory();
    tokio::time::timeout(common::WAIT, inventory.wait_for(|files| !files.is_empty())).await??;

    manager.stop_session().await?;
    let mut events = manager.broadcaster().subscribe();
    let _ = inventory.borrow_and_update();

    tokio::time::sleep(POLL * 5).await;

    assert!(
        drain(&mut events)
            .iter()
            .all(|e| !matches!(e, SessionEvent::InventoryChanged { .. }))
    );
    assert!(!inventory.has_changed()?);
    Ok(())
}

#[tokio::test]
async fn test_unchanged_files_are_announced_once() -> Result<()> {
    let fx = Fixture::new()?;
    let manager = fx.manager();
    let mut events = manager.broadcaster().subscribe();

    manager.start_session().await?;
    fx.drop_file(UserFolder::Desktop, "todo.md", b"- [ ] write report")?;

    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::InventoryChanged { files } if !files.is_empty())
    })
    .await?;
    tokio::time::sleep(POLL * 6).await;

    assert!(
        drain(&mut events)
            .iter()
            .all(|e| !matches!(e, SessionEvent::InventoryChanged { .. }))
    );

    manager.stop_session().await?;
    Ok(())
}

#[tokio::test]
async fn test_status_changes_follow_lifecycle() -> Result<()> {
    let fx = Fixture::new()?;
    let manager = fx.manager();
    let mut events = manager.broadcaster().subscribe();

    manager.start_session().await?;
    manager.stop_session().await?;

    let statuses: Vec<SessionStatus> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::StatusChanged { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            SessionStatus::Starting,
            SessionStatus::Active,
            SessionStatus::Stopping,
            SessionStatus::Idle,
        ]
    );
    Ok(())
}

// =============================================================================
// Recovery
// =============================================================================

#[tokio::test]
async fn test_recover_cleans_residue_of_a_dead_process() -> Result<()> {
    let fx = Fixture::with(FixtureOptions {
        backend: BackendKind::Junction,
        ..FixtureOptions::default()
    })?;
    fs::write(fx.home().join("Music/track.ogg"), b"ogg")?;
    fx.manager().start_session().await?;
    assert!(fx.home().join("Music.backup/track.ogg").is_file());

    // The process dies without stopping; a new one starts over the same dirs.
    let Fixture { dir, host, .. } = fx;
    drop(host);
    let restarted = Fixture::in_dir(
        dir,
        FixtureOptions {
            backend: BackendKind::Junction,
            ..FixtureOptions::default()
        },
    )?;

    let report = restarted.manager().recover().await?;

    assert_eq!(report.warning_count(), 0, "{:?}", report.warnings());
    assert!(restarted.home().join("Music/track.ogg").is_file());
    assert!(!restarted.home().join("Music.backup").exists());
    assert_eq!(restarted.manager().status(), SessionStatus::Idle);
    Ok(())
}
