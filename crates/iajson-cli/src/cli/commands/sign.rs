use iajson_client::{
    create_signed_headers, create_signed_headers_at, verify, ClientConfig, HmacAlgorithm,
};

use crate::cli::args::{AlgorithmArg, SignArgs, VerifySignatureArgs};
use crate::cli::{EXIT_SUCCESS, EXIT_USAGE};

fn algorithm(arg: AlgorithmArg) -> HmacAlgorithm {
    match arg {
        AlgorithmArg::Sha256 => HmacAlgorithm::Sha256,
        AlgorithmArg::Sha512 => HmacAlgorithm::Sha512,
    }
}

pub fn run(args: SignArgs) -> anyhow::Result<i32> {
    let alg = algorithm(args.algorithm);
    let headers = match args.timestamp {
        Some(ts) => create_signed_headers_at(
            &args.api_key,
            &args.secret,
            &args.body,
            alg,
            &args.header_prefix,
            ts,
        ),
        None => create_signed_headers(
            &args.api_key,
            &args.secret,
            &args.body,
            alg,
            &args.header_prefix,
        ),
    };

    for (name, value) in headers.into_pairs() {
        println!("{name}: {value}");
    }
    Ok(EXIT_SUCCESS)
}

pub fn run_verify(args: VerifySignatureArgs) -> anyhow::Result<i32> {
    let valid = verify(
        &args.secret,
        &args.signature,
        args.timestamp,
        &args.body,
        algorithm(args.algorithm),
        args.max_age
            .unwrap_or_else(|| ClientConfig::from_env().replay_window_secs),
    );

    if valid {
        println!("valid");
        Ok(EXIT_SUCCESS)
    } else {
        println!("invalid");
        Ok(EXIT_USAGE)
    }
}
