#![forbid(unsafe_code)]

//! Sigill CLI: sign, verify and inspect XML-DSig documents.
//!
//! Exit status is 0 on success, 1 when a signature is invalid and 2 on any
//! error.

use clap::{Parser, Subcommand};
use sigill::Settings;
use sigill_c14n::C14nMethod;
use sigill_core::{algorithm, Error};
use sigill_crypto::{HashType, PublicKey, SigningKey};
use sigill_dsig::{signature_method, DsigContext, Reference, SignedInfo, ValidationResult, XmlSignature};
use sigill_keys::{KeyInfo, KeyInfoContent, KeyInfoFactory, KeyValueContent, X509Content};
use sigill_transforms::enveloped::EnvelopedSignatureTransform;
use sigill_transforms::{C14nTransform, TransformPipeline};
use sigill_xml::XmlDocument;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sigill", about = "Sigill: pure Rust XML Digital Signatures", version)]
struct Cli {
    /// Settings file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Register additional ID attribute names
    #[arg(long = "id-attr", global = true)]
    id_attr: Vec<String>,

    /// Turn off secure validation limits
    #[arg(long, global = true)]
    permissive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an enveloped signature to an XML document
    Sign {
        /// Input XML file
        file: PathBuf,

        /// PKCS#8 PEM private key
        #[arg(short = 'k', long)]
        key: PathBuf,

        /// Signature method URI (default: chosen from the key type)
        #[arg(long)]
        method: Option<String>,

        /// Canonicalization method URI
        #[arg(long, default_value = algorithm::EXC_C14N)]
        c14n: String,

        /// Digest method URI
        #[arg(long, default_value = algorithm::SHA256)]
        digest: String,

        /// Embed the public key as a KeyValue
        #[arg(long = "key-value")]
        key_value: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate the first signature in an XML document
    Verify {
        /// Input XML file
        file: PathBuf,

        /// SubjectPublicKeyInfo PEM public key (default: resolved from KeyInfo)
        #[arg(short = 'k', long)]
        key: Option<PathBuf>,
    },

    /// Print the decoded SignedInfo and KeyInfo of the first signature
    Inspect {
        /// Input XML file
        file: PathBuf,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Sigill(#[from] Error),

    #[error("configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no ds:Signature element in {}", .0.display())]
    NoSignature(PathBuf),
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sigill=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    settings.id_attrs.extend(cli.id_attr);
    if cli.permissive {
        settings.policy.secure_validation = false;
    }
    let ctx = settings.dsig_context();

    match cli.command {
        Commands::Sign {
            file,
            key,
            method,
            c14n,
            digest,
            key_value,
            output,
        } => cmd_sign(&ctx, &file, &key, method.as_deref(), &c14n, &digest, key_value, output),
        Commands::Verify { file, key } => cmd_verify(&ctx, &file, key.as_deref()),
        Commands::Inspect { file } => cmd_inspect(&ctx, &file),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_sign(
    ctx: &DsigContext,
    file: &Path,
    key_path: &Path,
    method: Option<&str>,
    c14n: &str,
    digest: &str,
    key_value: bool,
    output: Option<PathBuf>,
) -> Result<ExitCode, CliError> {
    let mut document = XmlDocument::parse(&read_file(file)?)?;
    let key = SigningKey::from_pkcs8_pem(&read_file(key_path)?)?;
    let method_uri = match method {
        Some(uri) => uri,
        None => default_method(&key)?,
    };

    let reference = Reference::new(
        "",
        HashType::from_digest_uri(digest)?,
        TransformPipeline::new()
            .with(Box::new(EnvelopedSignatureTransform))
            .with(Box::new(C14nTransform::new(C14nMethod::from_uri(c14n)?))),
    );
    let signed_info = SignedInfo::new(
        C14nMethod::from_uri(c14n)?.into_shared(),
        signature_method::resolve(method_uri)?,
        vec![reference],
        None,
    )?;

    let key_info = match (key_value, key.public_key()) {
        (true, Some(public)) => {
            let factory = KeyInfoFactory::new();
            Some(factory.new_key_info(
                vec![KeyInfoContent::KeyValue(factory.new_key_value(&public)?)],
                None,
            )?)
        }
        _ => None,
    };

    tracing::info!(file = %file.display(), method = method_uri, "signing");
    let mut signature = XmlSignature::new(signed_info, key_info, None);
    signature.sign_enveloped(&mut document, &key, ctx)?;
    write_output(output, document.to_xml_string().as_bytes())?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_verify(ctx: &DsigContext, file: &Path, key_path: Option<&Path>) -> Result<ExitCode, CliError> {
    let document = XmlDocument::parse(&read_file(file)?)?;
    let path = XmlSignature::find(&document).ok_or_else(|| CliError::NoSignature(file.to_path_buf()))?;
    let key = match key_path {
        Some(p) => Some(SigningKey::from(PublicKey::from_spki_pem(&read_file(p)?)?)),
        None => None,
    };

    let result = XmlSignature::unmarshal(&document, &path, ctx).and_then(|signature| match &key {
        Some(key) => signature.validate(key, &document, ctx),
        None => signature.validate_with_key_info(&document, ctx),
    });

    match result {
        Ok(ValidationResult::Valid) => {
            println!("OK");
            Ok(ExitCode::SUCCESS)
        }
        Ok(invalid) => {
            println!("INVALID: {invalid}");
            Ok(ExitCode::from(1))
        }
        Err(e) if e.is_policy_violation() => {
            tracing::warn!(error = %e, "rejected by validation policy");
            println!("INVALID: {e}");
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_inspect(ctx: &DsigContext, file: &Path) -> Result<ExitCode, CliError> {
    let document = XmlDocument::parse(&read_file(file)?)?;
    let signature = parse_first_signature(ctx, &document, file)?;
    let signed_info = signature.signed_info();

    println!("Signature {}", signature.id().unwrap_or("(no Id)"));
    println!("  CanonicalizationMethod: {}", signed_info.canonicalization().uri());
    println!("  SignatureMethod: {}", signed_info.signature_method().uri());
    if let Some(bits) = signed_info.signature_method().hmac_output_length() {
        println!("    HMACOutputLength: {bits}");
    }
    for (index, reference) in signed_info.references().iter().enumerate() {
        println!(
            "  Reference {index}: URI={:?} digest={} transforms={}",
            reference.uri().unwrap_or(""),
            reference.digest_method().digest_uri(),
            reference.transforms().len()
        );
    }

    match signature.key_info() {
        Some(key_info) => print_key_info(key_info),
        None => println!("  (no KeyInfo)"),
    }
    Ok(ExitCode::SUCCESS)
}

// ── Helpers ──────────────────────────────────────────────────────────

fn default_method(key: &SigningKey) -> Result<&'static str, Error> {
    match key {
        SigningKey::Rsa(_) => Ok(algorithm::RSA_SHA256),
        SigningKey::Dsa(_) => Ok(algorithm::DSA_SHA256),
        SigningKey::EcP256(_) => Ok(algorithm::ECDSA_SHA256),
        SigningKey::Hmac(_) => Ok(algorithm::HMAC_SHA256),
        _ => Err(Error::InvalidKey("a private key is required for signing".into())),
    }
}

fn parse_first_signature(
    ctx: &DsigContext,
    document: &XmlDocument,
    file: &Path,
) -> Result<XmlSignature, CliError> {
    let path = XmlSignature::find(document).ok_or_else(|| CliError::NoSignature(file.to_path_buf()))?;
    Ok(XmlSignature::unmarshal(document, &path, ctx)?)
}

fn print_key_info(key_info: &KeyInfo) {
    println!("  KeyInfo {}", key_info.id().unwrap_or("(no Id)"));
    for item in key_info.content() {
        match item {
            KeyInfoContent::KeyName(name) => println!("    KeyName: {name}"),
            KeyInfoContent::KeyValue(kv) => match kv.content() {
                KeyValueContent::Rsa { modulus, .. } => {
                    println!("    KeyValue: RSA ({} bits)", modulus.bits())
                }
                KeyValueContent::Dsa(dsa) => {
                    let bits = dsa.p_q.as_ref().map_or(0, |(p, _)| p.bits());
                    println!("    KeyValue: DSA ({bits} bits)")
                }
                KeyValueContent::Ec { curve_oid, .. } => println!("    KeyValue: EC (curve {curve_oid})"),
                KeyValueContent::Unknown(el) => println!("    KeyValue: {}", el.qualified_name()),
            },
            KeyInfoContent::RetrievalMethod(rm) => println!(
                "    RetrievalMethod: URI={:?} Type={}",
                rm.uri(),
                rm.type_().unwrap_or("(none)")
            ),
            KeyInfoContent::X509Data(data) => {
                println!("    X509Data:");
                for entry in data.content() {
                    match entry {
                        X509Content::SubjectName(name) => println!("      SubjectName: {name}"),
                        X509Content::Ski(ski) => println!("      SKI: {} bytes", ski.len()),
                        X509Content::Certificate(cert) => {
                            println!("      Certificate: subject {}", cert.tbs_certificate.subject)
                        }
                        X509Content::Crl(crl) => {
                            println!("      CRL: issuer {}", crl.tbs_cert_list.issuer)
                        }
                        X509Content::IssuerSerial(is) => {
                            println!("      IssuerSerial: {} #{}", is.issuer_name, is.serial_number)
                        }
                        X509Content::Opaque(el) => println!("      {}", el.qualified_name()),
                    }
                }
            }
            KeyInfoContent::DerEncodedKeyValue(der) => {
                println!("    DEREncodedKeyValue: {} bytes", der.len())
            }
            KeyInfoContent::Opaque(el) => println!("    {}", el.qualified_name()),
        }
    }
}

fn read_file(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_output(path: Option<PathBuf>, data: &[u8]) -> Result<(), CliError> {
    match path {
        Some(p) => std::fs::write(&p, data).map_err(|source| CliError::Io { path: p, source }),
        None => {
            use std::io::Write;
            std::io::stdout().write_all(data).map_err(|source| CliError::Io {
                path: PathBuf::from("<stdout>"),
                source,
            })
        }
    }
}
