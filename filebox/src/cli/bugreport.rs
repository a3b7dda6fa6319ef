use bugreport::{
    bugreport,
    collector::{CompileTimeInformation, EnvironmentVariables, OperatingSystem, SoftwareVersion},
    format::Markdown,
};

pub fn run() {
    bugreport!()
        .info(SoftwareVersion::default())
        .info(OperatingSystem::default())
        .info(EnvironmentVariables::list(&[
            "SHELL",
            "TERM",
            "RUST_LOG",
            "FILEBOX_DATA_DIR",
            "FILEBOX_DATA_FILE",
            "FILEBOX_UPLOADS_DIR",
            "FILEBOX_PORT",
            "FILEBOX_SESSION_TTL_HOURS",
            "FILEBOX_MAX_FILE_SIZE",
            "FILEBOX_MAX_FILES",
        ]))
        .info(CompileTimeInformation::default())
        .print::<Markdown>();
}
