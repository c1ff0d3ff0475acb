use eeg_core::{EegError, RawRecord, DEFAULT_WAVEFORM_KEY};
use eeg_processing::{
    process_records, ArtifactMethod, Pipeline, PipelineConfig, RecordConfig, RejectionReason,
    ReshapedTable, TableForm,
};
use eeg_simulation::{EegSimConfig, EegSimulator};
use serde_json::json;
use std::f64::consts::PI;

/// Records 3, 7 and 11 are truncated; records 1 and 5 carry a 300µV rhythm
fn mixed_records() -> Vec<RawRecord> {
    let config = EegSimConfig {
        seed: Some(2025),
        malformed_every: Some(4),
        ..Default::default()
    };
    let mut records = EegSimulator::new(config).unwrap().generate_records(12);

    let loud: Vec<f64> = (0..256)
        .map(|i| 300.0 * (2.0 * PI * 10.0 * i as f64 / 256.0).sin())
        .collect();
    for index in [1, 5] {
        records[index].insert(DEFAULT_WAVEFORM_KEY, loud.clone());
    }

    records
}

#[test]
fn test_row_count_matches_valid_and_clean_records() {
    let records = mixed_records();
    let output = Pipeline::new(PipelineConfig::default())
        .unwrap()
        .run(&records)
        .unwrap();

    assert_eq!(output.features.len(), 12 - 3 - 2);

    let dropped: Vec<usize> = output.rejected_records.iter().map(|r| r.record_index).collect();
    assert_eq!(dropped, vec![3, 7, 11]);

    assert_eq!(output.rejected_segments.len(), 2);
    assert!(output.rejected_segments.iter().all(|r| r.reason
        == RejectionReason::Artifact {
            method: "amplitude".to_string()
        }));
    assert_eq!(output.rejected_segments[0].segment, "seg_1");
    // Record 5 is the fifth retained record, behind malformed record 3
    assert_eq!(output.rejected_segments[1].segment, "seg_4");
}

#[test]
fn test_counts_reconcile() {
    let records = mixed_records();
    let output = Pipeline::new(PipelineConfig::default())
        .unwrap()
        .run(&records)
        .unwrap();
    let stats = &output.stats;

    assert_eq!(stats.records_in, records.len());
    assert_eq!(
        stats.records_in,
        stats.records_retained + output.rejected_records.len()
    );
    assert_eq!(
        stats.segments,
        output.features.len() + output.rejected_segments.len()
    );
    assert_eq!(stats.segments_kept, output.features.len());
    assert_eq!(stats.artifacts, 2);
    assert_eq!(stats.computation_failures, 0);
    assert_eq!(output.long.len(), stats.records_retained * 256);
}

#[test]
fn test_features_carry_identity_and_filtered_columns() {
    let output = Pipeline::new(PipelineConfig::default())
        .unwrap()
        .run(&mixed_records())
        .unwrap();

    let columns = output.features.columns();
    for name in ["segment", "utc_ts", "session_type", "alpha", "alpha_fil", "engagement_fil"] {
        assert!(columns.iter().any(|c| c == name), "missing column {}", name);
    }

    let stamps: Vec<f64> = output
        .features
        .rows
        .iter()
        .map(|r| r.identity.utc_ts.unwrap())
        .collect();
    assert!(stamps.windows(2).all(|w| w[1] > w[0]));

    for row in &output.features.rows {
        assert_eq!(row.identity.document_name.as_deref(), Some("subject@example.com"));
        assert_eq!(row.identity.session_id.as_deref(), Some("session-001"));
        // Resting pattern is alpha dominated
        assert!(row.get("alpha").unwrap() > row.get("beta").unwrap());
    }
}

#[test]
fn test_deterministic_and_parallel_equivalent() {
    let records = mixed_records();
    let sequential = Pipeline::new(PipelineConfig::default()).unwrap();
    let parallel = Pipeline::new(PipelineConfig::default().with_parallel(true)).unwrap();

    let first = sequential.run(&records).unwrap();
    let second = sequential.run(&records).unwrap();
    let fanned = parallel.run(&records).unwrap();

    assert_eq!(first.features, second.features);
    assert_eq!(first.features, fanned.features);
    assert_eq!(first.rejected_segments, fanned.rejected_segments);
}

#[test]
fn test_long_form_minimal_schema() {
    let records: Vec<RawRecord> = (0..3)
        .map(|i| {
            RawRecord::new()
                .with_field(DEFAULT_WAVEFORM_KEY, vec![0.5; 256])
                .with_field("timestamp", format!("2025-07-01T00:00:0{}Z", i))
                .with_field("focus_type", "calm")
                .with_field("device", "headband-7")
        })
        .chain(std::iter::once(
            RawRecord::new()
                .with_field(DEFAULT_WAVEFORM_KEY, vec![0.5; 100])
                .with_field("timestamp", "2025-07-01T00:00:09Z")
                .with_field("focus_type", "calm"),
        ))
        .collect();

    let output = process_records(&records, 256, &RecordConfig::default(), TableForm::Long).unwrap();
    let ReshapedTable::Long(table) = &output.table else {
        panic!("expected long form");
    };

    assert_eq!(table.columns(), vec!["waveform", "timestamp", "utc_ts", "focus_type"]);
    assert_eq!(table.len(), 3 * 256);
    assert_eq!(output.rejected.len(), 1);
    assert_eq!(output.table.segments().len(), 3);
}

#[test]
fn test_arousal_preset_postprocesses() {
    let config = EegSimConfig {
        seed: Some(11),
        ..Default::default()
    };
    let records = EegSimulator::new(config).unwrap().generate_records(8);

    let mut pipeline_config = PipelineConfig::arousal();
    pipeline_config.artifact = None;
    let output = Pipeline::new(pipeline_config).unwrap().run(&records).unwrap();

    assert_eq!(output.features.len(), 8);
    for column in ["gamma_fil", "gamma1_fil", "gamma2_fil"] {
        let values = output.features.column(column).unwrap();
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)), "{} {:?}", column, values);
        assert!(values.iter().any(|&v| v == 0.0));
        assert!(values.iter().any(|&v| v == 1.0));
    }

    let elapsed = output.features.column("elapsed_s").unwrap();
    assert_eq!(elapsed[0], 0.0);
    assert!((elapsed[7] - 7.0).abs() < 1e-6);
}

#[test]
fn test_zscore_gate_from_json() {
    let config = PipelineConfig::from_json(
        &json!({
            "artifact": {"method": "zscore", "z_thresh": 3.0},
            "filter": null
        })
        .to_string(),
    )
    .unwrap();
    assert_eq!(config.artifact, Some(ArtifactMethod::zscore()));
    assert!(config.filter.is_none());

    let mut records = mixed_records();
    records.truncate(3);
    // 20 large excursions in one segment
    let mut spiky: Vec<f64> = (0..256)
        .map(|i| 5.0 * (2.0 * PI * 10.0 * i as f64 / 256.0).sin())
        .collect();
    for i in 0..20 {
        spiky[i * 12] = 200.0;
    }
    records[0].insert(DEFAULT_WAVEFORM_KEY, spiky);

    let output = Pipeline::new(config).unwrap().run(&records).unwrap();
    assert_eq!(output.rejected_segments.len(), 1);
    assert_eq!(output.rejected_segments[0].segment, "seg_0");
    assert_eq!(output.features.len(), 2);
}

#[test]
fn test_gamma_power_gate_rejects_muscle_record() {
    let config = EegSimConfig {
        seed: Some(31),
        ..Default::default()
    };
    let mut records = EegSimulator::new(config).unwrap().generate_records(4);

    let clench: Vec<f64> = (0..256)
        .map(|i| 30.0 * (2.0 * PI * 40.0 * i as f64 / 256.0).sin())
        .collect();
    records[2].insert(DEFAULT_WAVEFORM_KEY, clench);

    let pipeline_config =
        PipelineConfig::default().with_artifact(Some(ArtifactMethod::gamma_power()));
    let output = Pipeline::new(pipeline_config).unwrap().run(&records).unwrap();

    assert_eq!(output.features.len(), 3);
    assert_eq!(output.rejected_segments.len(), 1);
    assert_eq!(output.rejected_segments[0].segment, "seg_2");
    assert_eq!(
        output.rejected_segments[0].reason,
        RejectionReason::Artifact {
            method: "gamma_power".to_string()
        }
    );
    assert_eq!(output.stats.artifacts, 1);
}

#[test]
fn test_invalid_configuration_fails_before_processing() {
    let err = PipelineConfig::from_json(r#"{"artifact": {"method": "eyeblink"}}"#).unwrap_err();
    assert!(matches!(err, EegError::Configuration { .. }));
    assert!(err.to_string().contains("eyeblink"));

    let err = Pipeline::new(PipelineConfig::default().with_sampling_rate(0)).err().unwrap();
    assert!(err.is_fatal());
}
