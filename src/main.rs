use clap::Parser;
use color_eyre::eyre::Result;
use duskferry::model::{validate_arguments, Args, CallbackSurface};
use duskferry::session::UploadSession;
use duskferry::transport::{SshCredentials, SshTransport};

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    validate_arguments(&args)?;
    log::debug!("parsed arguments: {args:?}");

    let callbacks = CallbackSurface::default_for(&args.dated_regex)?;

    let transport = SshTransport::connect(SshCredentials {
        host: &args.host,
        port: args.port,
        username: &args.username,
        password: args.password.as_deref(),
        identity_file: args.identity_file.as_deref(),
    })?;

    let session = UploadSession::new(&args, &transport, &callbacks)?;
    session.run(args.remove_after_upload)?;

    Ok(())
}
