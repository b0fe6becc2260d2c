#![allow(non_snake_case)]
use RustedLMFit::Examples::lm_examples::lm_examples;

fn main() {
    let example = 0;
    match lm_examples(example) {
        Ok(()) => {}
        Err(e) => eprintln!("example {} failed: {}", example, e),
    }
}
