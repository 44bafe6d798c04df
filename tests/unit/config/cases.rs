use super::*;
use crate::config::effects::CompositionConfig;

#[test]
fn twenty_cases_numbered_from_one() {
    let cases = builtin();
    assert_eq!(cases.len(), 20);
    assert_eq!(cases[0].number, 1);
    assert_eq!(cases[19].number, 20);
}

#[test]
fn case_four_uses_every_effect_once() {
    let case = find(4).unwrap();
    let effects: Vec<_> = case.tracks.iter().map(|t| t.effect).collect();
    assert_eq!(effects, EffectId::ALL.to_vec());
    assert!(case.tracks.iter().all(|t| t.clip == Clip::Portrait1080p30));
    assert!(find(21).is_err());
}

#[test]
fn heaviest_track_accounts_for_playback_speed() {
    let cfg = CompositionConfig::builtin();
    let case = find(8).unwrap();
    let heaviest = case
        .heaviest_track(|e| cfg.params(e).map(|p| p.play_speed()).unwrap_or(1.0))
        .unwrap();
    // 4K60 at double speed beats 1080p120 at quarter speed.
    assert_eq!(case.tracks[heaviest].clip, Clip::Uhd60);
}

#[test]
fn clip_labels_describe_geometry() {
    assert_eq!(Clip::Portrait1080p30.label(), "1080x1920@30");
    assert_eq!(Clip::Fhd120.fps().num, 120);
}
