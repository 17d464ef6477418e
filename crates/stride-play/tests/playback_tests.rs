use std::sync::Arc;

use stride_core::{AtomRange, Structure};
use stride_engine::{
    Interpolation, LoopMode, PlayerOptions, ProcessingOptions, Trajectory, TrajectoryOptions,
};
use stride_play::{
    function_source, parse_loop_mode, request_source, run_playback, PlaybackConfig, SourceKind,
    SyntheticOptions, SyntheticTrajectory,
};

fn quick_config(source: SourceKind, mode: LoopMode, ticks: usize) -> PlaybackConfig {
    PlaybackConfig {
        synthetic: SyntheticOptions {
            frames: 6,
            atoms: 8,
            seed: 11,
            ..SyntheticOptions::default()
        },
        trajectory: TrajectoryOptions::default(),
        player: PlayerOptions {
            interval_ms: 0,
            mode,
            ..PlayerOptions::default()
        },
        source,
        ticks,
    }
}

#[test]
fn synthetic_generation_is_deterministic() {
    let options = SyntheticOptions {
        frames: 4,
        atoms: 10,
        seed: 42,
        box_length: 20.0,
    };
    let a = SyntheticTrajectory::generate(&options);
    let b = SyntheticTrajectory::generate(&options);
    for i in 0..4 {
        assert_eq!(a.positions(i).unwrap(), b.positions(i).unwrap());
    }
    let c = SyntheticTrajectory::generate(&SyntheticOptions {
        seed: 43,
        ..options
    });
    assert_ne!(a.positions(0).unwrap(), c.positions(0).unwrap());
}

#[test]
fn gather_restricts_to_the_requested_ranges() {
    let traj = SyntheticTrajectory::generate(&SyntheticOptions {
        frames: 2,
        atoms: 10,
        ..SyntheticOptions::default()
    });
    let ranges = vec![
        AtomRange { start: 0, end: 2 },
        AtomRange { start: 7, end: 10 },
    ];
    let flat = traj.gather(1, &ranges).unwrap();
    assert_eq!(flat.len(), 5 * 3);
    assert_eq!(flat[0], traj.positions(1).unwrap()[0][0]);
    assert_eq!(flat[6], traj.positions(1).unwrap()[7][0]);
    assert!(traj.gather(2, &ranges).is_none(), "frame out of range");
}

#[test]
fn function_and_request_sources_serve_identical_frames() {
    let shared = Arc::new(SyntheticTrajectory::generate(&SyntheticOptions {
        frames: 3,
        atoms: 5,
        ..SyntheticOptions::default()
    }));
    let options = TrajectoryOptions {
        processing: ProcessingOptions::raw(),
        ..TrajectoryOptions::default()
    };
    let mut direct = Trajectory::new(
        function_source(shared.clone()),
        Structure::new(5),
        options.clone(),
    );
    let mut wired = Trajectory::new(request_source(shared.clone()), Structure::new(5), options);
    direct.pump();
    wired.pump();
    direct.set_frame(2);
    direct.pump();
    wired.set_frame(2);
    wired.pump();

    let a = direct.current().unwrap();
    let b = wired.current().unwrap();
    assert_eq!(a.positions, b.positions, "same data through both adapters");
    assert_eq!(a.positions[3], shared.positions(2).unwrap()[3]);
}

#[test]
fn full_run_with_a_function_source() {
    let summary = run_playback(&quick_config(SourceKind::Function, LoopMode::Loop, 20)).unwrap();
    assert_eq!(summary.frame_count, 6);
    assert_eq!(summary.ticks, 20);
    assert_eq!(summary.failures, 0);
    assert!(summary.frames_presented > 20, "initial frame plus advances");
    assert_eq!(summary.cached_frames, 6, "whole trajectory fits the cache");
    assert!(summary.final_frame.is_some());
}

#[test]
fn full_run_with_a_request_source_stops_at_once_boundary() {
    let summary = run_playback(&quick_config(SourceKind::Request, LoopMode::Once, 500)).unwrap();
    assert_eq!(summary.frame_count, 6);
    assert_eq!(summary.final_frame, Some(5), "played to the last frame");
    assert_eq!(summary.frames_presented, 6);
    assert_eq!(summary.ticks, 6, "five advances plus the stopping tick");
    assert_eq!(summary.failures, 0);
}

#[test]
fn frame_times_follow_the_configured_axis() {
    let mut config = quick_config(SourceKind::Function, LoopMode::Once, 500);
    config.trajectory.delta_time = 2.0;
    config.trajectory.time_offset = 10.0;
    let summary = run_playback(&config).unwrap();
    assert_eq!(summary.final_frame, Some(5));
    assert_eq!(summary.final_time, Some(20.0));
}

#[test]
fn interpolated_run_still_converges() {
    let mut config = quick_config(SourceKind::Function, LoopMode::Once, 500);
    config.player.interpolation = Interpolation::Linear;
    config.player.interpolate_step = 2;
    let summary = run_playback(&config).unwrap();
    assert_eq!(summary.final_frame, Some(5));
    assert_eq!(summary.failures, 0);
}

#[test]
fn config_round_trips_through_json() {
    let config = quick_config(SourceKind::Request, LoopMode::Bounce, 12);
    let rendered = serde_json::to_string(&config).unwrap();
    let back: PlaybackConfig = serde_json::from_str(&rendered).unwrap();
    assert_eq!(back.source, SourceKind::Request);
    assert_eq!(back.player.mode, LoopMode::Bounce);
    assert_eq!(back.ticks, 12);
    assert_eq!(back.synthetic, config.synthetic);

    let defaults: PlaybackConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(defaults.source, SourceKind::Function);
    assert_eq!(defaults.ticks, 100);
    assert_eq!(defaults.player, PlayerOptions::default());
}

#[test]
fn cli_name_parsers_reject_unknown_values() {
    assert!(parse_loop_mode("bounce").is_ok());
    assert!(parse_loop_mode("backwards").is_err());
    assert!(SourceKind::parse("request").is_ok());
    assert!(SourceKind::parse("socket").is_err());
}

#[test]
fn superposition_defaults_keep_the_helix_anchored() {
    // default processing aligns every frame onto frame 0, so the first
    // atom barely moves across the whole run
    let config = quick_config(SourceKind::Function, LoopMode::Once, 500);
    assert!(config.trajectory.processing.superpose);
    assert_eq!(config.trajectory.processing, ProcessingOptions::default());
    let summary = run_playback(&config).unwrap();
    assert_eq!(summary.failures, 0);
}
