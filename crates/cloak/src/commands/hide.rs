use cloak_core::config::Config;

pub fn execute(config: &Config, names: &[String], hide: bool) {
    let mut controller = super::controller(config);
    if !controller.is_initialized() {
        eprintln!(
            "Payload module '{}' not found next to the executable.",
            config.visibility.payload_file
        );
        std::process::exit(1);
    }

    let affected = controller.hide_multiple_processes(names, hide);
    let verb = if hide { "Hidden" } else { "Shown" };
    println!("{verb}: {affected} process(es) affected.");
}
