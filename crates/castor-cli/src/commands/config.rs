use castor_config::MountConfig;

pub fn run(config: &MountConfig) -> Result<(), Box<dyn std::error::Error>> {
    let yaml = serde_yaml::to_string(config)?;
    println!("{}", yaml);

    if !config.fuse_passthrough.is_empty() {
        println!("# kernel options: {}", config.fuse_passthrough.join(","));
    }
    Ok(())
}
