use std::{
    env, fs,
    io::{BufReader, Cursor},
    path::PathBuf,
    process,
};

use online_gd::{
    Example, GdConfig, GdErr, Learner,
    training::{Driver, GdBuilder},
};

fn driver(json: &str) -> Driver {
    Driver::from_config(GdConfig::from_json(json).unwrap()).unwrap()
}

fn example(label: Option<f32>, features: &[(f32, u32)]) -> Example {
    let mut ec = Example::new(label);
    for &(x, index) in features {
        ec.push_feature(b'a', x, index);
    }
    ec.add_constant();
    ec
}

fn train(driver: &mut Driver) {
    let mut examples = [
        example(Some(1.), &[(1., 3), (0.5, 9)]),
        example(Some(0.), &[(2., 4)]),
        example(Some(0.5), &[(1., 3), (3., 4)]),
    ];
    for ec in examples.iter_mut() {
        driver.learn(ec);
    }
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = env::temp_dir().join(format!("online_gd_{name}_{}", process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn binary_regressor_round_trip() {
    const CONFIG: &str = r#"{ "num_bits": 8 }"#;

    let mut trained = driver(CONFIG);
    train(&mut trained);

    let mut model = Vec::new();
    trained.save(&mut model, false).unwrap();

    let mut restored = driver(CONFIG);
    restored.load(&mut Cursor::new(model), false).unwrap();

    let original: Vec<f32> = trained.context().weights.groups().map(|g| g[0]).collect();
    let loaded: Vec<f32> = restored.context().weights.groups().map(|g| g[0]).collect();
    assert_eq!(original, loaded);
    assert!(original.iter().any(|w| *w != 0.));
}

#[test]
fn resume_round_trip_keeps_statistics_and_counters() {
    const CONFIG: &str = r#"{ "num_bits": 8, "save_resume": true }"#;

    let mut trained = driver(CONFIG);
    train(&mut trained);

    let mut model = Vec::new();
    trained.save(&mut model, false).unwrap();

    let mut restored = driver(CONFIG);
    restored.load(&mut Cursor::new(model), false).unwrap();

    let (a, b) = (trained.context(), restored.context());
    assert_eq!(a.weights.as_slice(), b.weights.as_slice());
    assert_eq!(a.sd.t, b.sd.t);
    assert_eq!(a.sd.sum_loss, b.sd.sum_loss);
    assert_eq!(a.sd.normalized_sum_norm_x, b.sd.normalized_sum_norm_x);
    assert_eq!(a.sd.example_number, b.sd.example_number);
    assert_eq!(a.sd.total_features, b.sd.total_features);
    assert_eq!((a.sd.min_label, a.sd.max_label), (b.sd.min_label, b.sd.max_label));
}

#[test]
fn resumed_training_matches_uninterrupted_training() {
    const CONFIG: &str = r#"{ "num_bits": 8, "save_resume": true }"#;
    let next = || example(Some(1.), &[(1., 3), (2., 9)]);

    let mut uninterrupted = driver(CONFIG);
    train(&mut uninterrupted);
    uninterrupted.learn(&mut next());

    let mut first = driver(CONFIG);
    train(&mut first);
    let mut model = Vec::new();
    first.save(&mut model, false).unwrap();

    let mut resumed = driver(CONFIG);
    resumed.load(&mut Cursor::new(model), false).unwrap();
    resumed.learn(&mut next());

    assert_eq!(
        uninterrupted.context().weights.as_slice(),
        resumed.context().weights.as_slice()
    );
}

#[test]
fn evaluation_load_resets_counters_and_statistics() {
    let mut trained = driver(r#"{ "num_bits": 8, "save_resume": true }"#);
    train(&mut trained);

    let mut model = Vec::new();
    trained.save(&mut model, false).unwrap();

    let mut evaluator = driver(r#"{ "num_bits": 8, "save_resume": true, "training": false }"#);
    evaluator.load(&mut Cursor::new(model), false).unwrap();

    let ctx = evaluator.context();
    let layout = ctx.weights.layout();
    assert_eq!(ctx.sd.sum_loss, 0.);
    assert_eq!(ctx.sd.example_number, 0);
    assert!(ctx.weights.groups().all(|g| g[layout.adaptive] == 0. && g[layout.normalized] == 0.));

    let base: Vec<f32> = trained.context().weights.groups().map(|g| g[0]).collect();
    let loaded: Vec<f32> = ctx.weights.groups().map(|g| g[0]).collect();
    assert_eq!(base, loaded);

    let before = evaluator.context().weights.as_slice().to_vec();
    evaluator.learn(&mut example(Some(1.), &[(1., 3)]));
    assert_eq!(before, evaluator.context().weights.as_slice());
}

#[test]
fn text_regressor_lists_non_zero_weights() {
    let mut trained = driver(r#"{ "num_bits": 8, "update_rule": { "invariant": true } }"#);
    train(&mut trained);

    let mut model = Vec::new();
    trained.save(&mut model, true).unwrap();
    let text = String::from_utf8(model).unwrap();

    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(":0"));

    let entries: Vec<&str> = lines.collect();
    let non_zero = trained
        .context()
        .weights
        .groups()
        .filter(|g| g[0] != 0.)
        .count();
    assert_eq!(entries.len(), non_zero);
    assert!(entries.iter().all(|l| l.split_once(':').is_some()));
}

fn assert_close(a: &[f32], b: &[f32]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert!((x - y).abs() <= 1e-6 + 1e-5 * x.abs(), "{x} != {y}");
    }
}

#[test]
fn text_regressor_loads_back() {
    const CONFIG: &str = r#"{ "num_bits": 8 }"#;

    let mut trained = driver(CONFIG);
    train(&mut trained);

    let mut model = Vec::new();
    trained.save(&mut model, true).unwrap();

    let mut restored = driver(CONFIG);
    restored.load(&mut Cursor::new(model), true).unwrap();

    let original: Vec<f32> = trained.context().weights.groups().map(|g| g[0]).collect();
    let loaded: Vec<f32> = restored.context().weights.groups().map(|g| g[0]).collect();
    assert!(original.iter().any(|w| *w != 0.));
    for (a, b) in original.iter().zip(&loaded) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[test]
fn text_resume_loads_back_statistics_and_counters() {
    const CONFIG: &str = r#"{ "num_bits": 8, "save_resume": true }"#;

    let mut trained = driver(CONFIG);
    train(&mut trained);

    let mut model = Vec::new();
    trained.save(&mut model, true).unwrap();
    assert!(model.starts_with(b":1\n"));

    let mut restored = driver(CONFIG);
    restored.load(&mut Cursor::new(model), true).unwrap();

    let (a, b) = (trained.context(), restored.context());
    let stats = a.weights.layout().stats();
    for (x, y) in a.weights.groups().zip(b.weights.groups()) {
        assert!((x[0] - y[0]).abs() <= 1e-6);
        assert_close(&x[1..stats], &y[1..stats]);
    }
    assert_eq!(a.sd.t, b.sd.t);
    assert_eq!(a.sd.example_number, b.sd.example_number);
    assert_eq!(a.sd.total_features, b.sd.total_features);
    assert!((a.sd.sum_loss - b.sd.sum_loss).abs() <= 1e-6);
    assert_close(&[a.sd.normalized_sum_norm_x], &[b.sd.normalized_sum_norm_x]);
    assert_eq!((a.sd.min_label, a.sd.max_label), (b.sd.min_label, b.sd.max_label));
}

#[test]
fn out_of_range_index_is_rejected() {
    let mut model = vec![0u8];
    model.extend_from_slice(&20u32.to_ne_bytes());
    model.extend_from_slice(&1f32.to_ne_bytes());

    let mut restored = driver(r#"{ "num_bits": 4 }"#);
    let err = restored.load(&mut Cursor::new(model), false).unwrap_err();

    assert!(matches!(err, GdErr::IndexOutOfRange { index: 20, length: 16 }));
}

#[test]
fn final_and_per_pass_models_are_written() {
    let dir = scratch_dir("final");
    let final_path = dir.join("model.bin");
    let readable_path = dir.join("model.txt");
    let json = format!(
        r#"{{ "num_bits": 8, "passes": 2, "save_per_pass": true, "holdout": {{ "off": true }},
             "final_regressor": {:?}, "readable_model": {:?} }}"#,
        final_path, readable_path
    );

    let mut trained = driver(&json);
    let mut examples = vec![example(Some(1.), &[(1., 3)]), example(Some(0.), &[(1., 4)])];
    trained.run(&mut examples).unwrap();

    assert!(final_path.exists());
    assert!(readable_path.exists());
    assert!(dir.join("model.bin.0").exists());
    assert!(dir.join("model.bin.1").exists());

    let mut reloaded = driver(r#"{ "num_bits": 8 }"#);
    let mut rx = BufReader::new(fs::File::open(&final_path).unwrap());
    reloaded.load(&mut rx, false).unwrap();
    assert_eq!(
        reloaded.context().weights.weight(3),
        trained.context().weights.weight(3)
    );

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn inverted_hash_names_features() {
    let dir = scratch_dir("invert");
    let inverted = dir.join("model.inv");
    let json = format!(r#"{{ "num_bits": 8, "invert_hash": {:?} }}"#, inverted);

    let mut trained = driver(&json);
    let mut ec = Example::new(Some(1.));
    ec.push_named_feature(b'a', 1., 3, "a", "age");
    ec.add_constant();
    trained.run(std::slice::from_mut(&mut ec)).unwrap();

    let text = fs::read_to_string(&inverted).unwrap();
    assert!(text.lines().any(|l| l.starts_with("a^age:3:")));
    assert!(text.lines().any(|l| l.starts_with("Constant:")));

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn feature_mask_freezes_unlisted_features() {
    let dir = scratch_dir("mask");
    let mask_path = dir.join("mask.bin");

    let mut masked_model = Vec::new();
    {
        let (mut learner, mut ctx) = GdBuilder::new()
            .build(GdConfig::from_json(r#"{ "num_bits": 8 }"#).unwrap())
            .unwrap();
        ctx.weights.group_mut(3)[0] = 1.;
        let mut io = online_gd::persistence::ModelIo::writer(&mut masked_model, false);
        learner.save_load(&mut ctx, &mut io).unwrap();
    }
    fs::write(&mask_path, masked_model).unwrap();

    let json = format!(r#"{{ "num_bits": 8, "feature_mask": {:?} }}"#, mask_path);
    let mut trained = driver(&json);
    assert_eq!(trained.context().weights.weight(3), 0.);

    let mut ec = example(Some(1.), &[(1., 3), (1., 4)]);
    trained.learn(&mut ec);

    assert!(trained.context().weights.weight(3) > 0.);
    assert_eq!(trained.context().weights.weight(4), 0.);

    fs::remove_dir_all(dir).unwrap();
}
