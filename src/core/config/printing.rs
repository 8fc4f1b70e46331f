use crate::core::config::data::{path_display, Config};

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        println!("  base-url: {}", self.base_url());
        if self.paths.is_empty() {
            println!("  paths: (defaults)");
        } else {
            println!("  paths:");
            for (operation, path) in &self.paths {
                println!("    {operation}: {path}");
            }
        }
        println!("  probe-timeout: {} ms", self.probe_timeout().as_millis());
        println!("  offline-cooldown: {} s", self.offline_cooldown().as_secs());
        println!(
            "  stream-idle-timeout: {} s",
            self.stream_idle_timeout().as_secs()
        );
        match self.use_retrieval() {
            true => println!(
                "  retrieval: on (k={}, threshold={:.2})",
                self.retrieval_k(),
                self.retrieval_threshold()
            ),
            false => println!("  retrieval: off"),
        }
        match self.resolved_data_dir() {
            Some(dir) => println!("  data-dir: {}", path_display(dir)),
            None => println!("  data-dir: (unavailable)"),
        }
    }
}
