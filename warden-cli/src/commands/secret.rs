use clap::{Args, ValueEnum};
use warden::credentials::{CredentialGenerator, SecretPolicy};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    Password,
    Passphrase,
    Key,
}

#[derive(Args, Debug)]
pub struct SecretArgs {
    #[arg(long, value_enum, default_value_t = SecretKind::Password)]
    pub kind: SecretKind,
}

pub fn execute(args: SecretArgs) -> anyhow::Result<()> {
    let mut generator = CredentialGenerator::new();
    let secret = match args.kind {
        SecretKind::Password => generator.secret(&SecretPolicy::password()),
        SecretKind::Passphrase => generator.secret(&SecretPolicy::passphrase()),
        SecretKind::Key => generator.key(),
    };
    println!("{}", secret.expose());
    Ok(())
}
