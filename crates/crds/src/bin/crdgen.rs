//! Prints the Submarine CRD as YAML, ready for `kubectl apply -f -`.

use crds::Submarine;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(&Submarine::crd())?;
    print!("{yaml}");
    Ok(())
}
