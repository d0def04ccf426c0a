use std::fs;

use zdeploy::config::env;
use zdeploy::error::ErrorKind;
use zdeploy::recipe::{Fingerprinter, HostTarget, Properties, Resolver};

// One test only: spawning a script while another test thread still holds it
// open for writing fails with ETXTBSY.
#[test]
fn hash_script_output_and_failures_feed_the_fingerprint() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let recipes = tmp.path().join("recipes");
    let web = recipes.join("web");
    fs::create_dir_all(&web).expect("recipe dir");
    fs::write(web.join("run"), "#!/bin/sh\n").expect("run");
    fs::write(
        web.join("hash"),
        "#!/bin/sh\ntest -f ./run || exit 9\necho \"$WEB_VERSION\"\n",
    )
    .expect("hash");
    let config = tmp.path().join("prod");
    fs::write(&config, "").expect("config");

    let resolver = Resolver::new(&recipes, &config);
    let target = HostTarget::new("10.0.0.1", "root", None, 22);
    let recipe = resolver
        .resolve("web", &target, Properties::new())
        .expect("resolve")
        .pop()
        .expect("web");

    let v1 = env::parse(&config, "WEB_VERSION=1.0\n").expect("v1");
    let v2 = env::parse(&config, "WEB_VERSION=2.0\n").expect("v2");
    let fp1 = Fingerprinter::with_declarations(&v1)
        .fingerprint(&recipe)
        .expect("fingerprint v1");
    let fp1_again = Fingerprinter::with_declarations(&v1)
        .fingerprint(&recipe)
        .expect("fingerprint v1 again");
    let fp2 = Fingerprinter::with_declarations(&v2)
        .fingerprint(&recipe)
        .expect("fingerprint v2");
    assert_eq!(fp1, fp1_again);
    assert_ne!(fp1, fp2);

    fs::write(web.join("hash"), "#!/bin/sh\necho nope\nexit 3\n").expect("failing hash");
    let err = Fingerprinter::new()
        .fingerprint(&recipe)
        .expect_err("hash script fails");
    assert_eq!(err.kind(), ErrorKind::Hash);
    assert!(err.message().contains("nope"));
}
