use modem_config::SequenceConfig;

#[derive(serde::Deserialize)]
struct Config {
    modem_baud: u32,
    rx_buffer_size: usize,
    sequence: SequenceConfig,
}

impl Config {
    fn check(&self) {
        assert!(self.modem_baud > 0, "modem_baud is invalid");
        assert!(self.rx_buffer_size > 1, "rx_buffer_size must leave room for the terminator");

        let commands = &self.sequence.commands;
        for cmd in commands
            .bring_up
            .iter()
            .chain(&commands.connect)
            .chain(&commands.http_setup)
        {
            assert!(!cmd.is_empty(), "command lists must not contain empty commands");
            assert!(
                !cmd.contains(['\r', '\n']),
                "command {cmd:?} contains a line terminator"
            );
        }

        let timings = &self.sequence.timings;
        for (name, poll) in [
            ("probe_interval_ms", timings.probe_interval_ms),
            ("ready_poll_ms", timings.ready_poll_ms),
            ("signal_poll_ms", timings.signal_poll_ms),
            ("ok_poll_ms", timings.ok_poll_ms),
            ("request_poll_ms", timings.request_poll_ms),
        ] {
            assert!(poll > 0, "{name} must be positive");
        }

        let http = &self.sequence.http;
        assert!(http.path.starts_with('/'), "http.path must start with '/'");
        assert!((1..=5).contains(&http.method), "http.method is invalid");
        assert!(http.read_len > 0, "http.read_len must be positive");
        assert!(
            http.read_len < self.rx_buffer_size as u64,
            "http.read_len does not fit the receive buffer"
        );
    }

    fn export_vars(&self) {
        println!("cargo:rustc-env=MODEM_BAUD={}", self.modem_baud);
        println!("cargo:rustc-env=RX_BUFFER_SIZE={}", self.rx_buffer_size);
    }
}

fn main() {
    if std::env::var("CARGO_CFG_TARGET_ARCH").as_deref() == Ok("xtensa") {
        println!("cargo:rustc-link-arg-bins=-Tlinkall.x");
    }

    println!("cargo:rerun-if-changed=config.yml");
    let config = {
        let config_string = std::fs::read_to_string("config.yml").expect("config.yml not found");
        serde_yaml::from_str::<Config>(&config_string).expect("config.yml is not valid")
    };
    config.check();
    config.export_vars();

    uneval::to_out_dir(config.sequence, "sequence_config.rs")
        .expect("Failed to write sequence_config.rs");
}
