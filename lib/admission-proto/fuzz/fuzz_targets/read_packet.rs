#![no_main]

use admission_proto::{check_checksum, Reader, Writer};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decode the raw input both with and without checksum verification, so the fuzzer is not stuck guessing CRCs.
    if let Ok(payload) = check_checksum(data) {
        read_all(payload);
    }
    let samples = read_all(data);

    // Anything that decoded cleanly must re-encode to something that decodes to the same samples.
    if let Some((preamble, samples)) = samples {
        let Ok(application) = std::str::from_utf8(&preamble.0) else {
            return;
        };
        let Ok(keys) = samples.iter().map(|(k, _)| std::str::from_utf8(k)).collect::<Result<Vec<_>, _>>() else {
            return;
        };

        let mut writer = Writer::new(preamble.2);
        let mut buf = Vec::new();
        writer.begin(&mut buf, application, &preamble.1, 0).unwrap();
        for (key, (_, value)) in keys.iter().zip(&samples) {
            writer.append(&mut buf, key, *value).unwrap();
        }

        let (_, reencoded) = read_all(&buf).unwrap();
        assert_eq!(reencoded.len(), samples.len());
        for ((key, value), (rkey, rvalue)) in samples.iter().zip(&reencoded) {
            assert_eq!(key, rkey);
            assert!(value.to_bits() == rvalue.to_bits() || (value.is_nan() && rvalue.is_nan()));
        }
    }
});

type Preamble = (Vec<u8>, Vec<u8>, admission_proto::FloatEncoding);

fn read_all(input: &[u8]) -> Option<(Preamble, Vec<(Vec<u8>, f64)>)> {
    let mut scratch = [0; 256];
    let mut reader = Reader::with_scratch(&mut scratch);

    let (mut rest, preamble) = reader.begin(input).ok()?;
    for _ in 0..preamble.header_count {
        let (next, _, _) = reader.next_header(rest).ok()?;
        rest = next;
    }

    let mut samples = Vec::new();
    while !rest.is_empty() {
        let (next, key, value) = reader.next(rest).ok()?;
        samples.push((key.to_vec(), value));
        rest = next;
    }

    Some((
        (
            preamble.application.to_vec(),
            preamble.instance_id.to_vec(),
            preamble.version.encoding(),
        ),
        samples,
    ))
}
