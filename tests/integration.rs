use std::{fs, path::PathBuf, process::Command};

fn run_bin(args: &[&str]) -> String {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_gs2post"));

    let output = Command::new(bin)
        .args(args)
        .output()
        .expect("failed to execute command");

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

    assert!(
        output.status.success(),
        "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
    );

    stdout_str.to_string()
}

#[test]
fn basic_workflow() {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("basic_workflow");

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");

    let style_path = test_dir.join("style.toml");
    let style_contents = String::new() + "dpi = 40\n" + "line_width = 1.0\n";
    fs::write(&style_path, style_contents).expect("failed to write style file");

    let params_path = test_dir.join("params.toml");
    let params_contents = String::new()
        + "n_t = 200\n"
        + "dt = 0.5\n"
        + "t_sat = 50.0\n"
        + "n_kx = 8\n"
        + "n_ky = 4\n"
        + "n_theta = 17\n"
        + "bpar = false\n";
    fs::write(&params_path, params_contents).expect("failed to write params file");

    let path_str = |path: &PathBuf| {
        path.to_str()
            .expect("failed to convert path to string")
            .to_string()
    };

    let data_dir = test_dir.join("data");
    fs::create_dir(&data_dir).expect("failed to create data directory");
    let dataset = path_str(&data_dir.join("run_a.msgpack"));
    let output_dir = path_str(&test_dir.join("outputs"));
    let style = path_str(&style_path);
    let params = path_str(&params_path);

    run_bin(&["synthesize", "--output", &dataset, "--params", &params]);
    let other_dataset = path_str(&data_dir.join("run_b.msgpack"));
    run_bin(&["synthesize", "--output", &other_dataset, "--seed", "3"]);

    let stdout = run_bin(&["saturation", "--dataset", &dataset, "--window", "5"]);
    let t_sat: f64 = stdout.trim().parse().expect("failed to parse saturation time");
    assert!((50.0..=55.0).contains(&t_sat), "t_sat = {t_sat}");

    let stdout = run_bin(&["saturation", "--dataset", &dataset, "--window", "1000"]);
    assert_eq!(stdout.trim(), "not found");

    let plot_args: [&str; 6] = [
        "--dataset",
        &dataset,
        "--output-dir",
        &output_dir,
        "--style",
        &style,
    ];
    run_bin(&[&["traces"][..], &plot_args[..], &["--window", "5"][..]].concat());
    run_bin(&[&["modes"][..], &plot_args[..]].concat());
    run_bin(&[&["transfer"][..], &plot_args[..], &["--filename", "transfer_last"][..]].concat());
    run_bin(&[&["transfer-averaged"][..], &plot_args[..], &["--window", "10"][..]].concat());

    let outputs = test_dir.join("outputs");
    for name in [
        "field_time_traces.png",
        "fields_by_mode.png",
        "transfer_last.png",
        "transfer_by_theta_averaged.png",
    ] {
        assert!(outputs.join(name).is_file(), "missing {name}");
    }

    let pattern = path_str(&data_dir.join("*.msgpack"));
    let batch_dir = path_str(&test_dir.join("batch"));
    run_bin(&["all", "--pattern", &pattern, "--output-dir", &batch_dir, "--style", &style]);
    for stem in ["run_a", "run_b"] {
        let n_figures = fs::read_dir(test_dir.join("batch").join(stem))
            .expect("failed to read batch directory")
            .count();
        assert_eq!(n_figures, 4);
    }

    run_bin(&["clean", "--output-dir", &batch_dir]);
    assert!(!test_dir.join("batch").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn invalid_arguments_fail() {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("invalid_arguments");

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");

    let dataset = test_dir.join("run.msgpack");
    let dataset = dataset.to_str().expect("failed to convert path to string");
    run_bin(&["synthesize", "--output", dataset]);

    let bin = PathBuf::from(env!("CARGO_BIN_EXE_gs2post"));
    for args in [
        vec!["saturation", "--dataset", dataset, "--window=-1"],
        vec!["saturation", "--dataset", dataset, "--threshold", "0"],
        vec!["saturation", "--dataset", "missing.msgpack"],
    ] {
        let status = Command::new(&bin)
            .args(&args)
            .status()
            .expect("failed to execute command");
        assert_eq!(status.code(), Some(1), "{args:?} should fail");
    }

    fs::remove_dir_all(&test_dir).ok();
}
