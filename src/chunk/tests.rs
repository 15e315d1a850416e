use super::*;

fn store(size: usize, overlap: usize) -> ChunkStore {
    ChunkStore::new(ChunkingConfig::new(size, overlap).unwrap()).unwrap()
}

fn lorem(words: usize) -> String {
    const VOCAB: [&str; 8] = ["lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit"];
    (0..words)
        .map(|i| VOCAB[(i * 5 + i / 3) % VOCAB.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn ids_are_dense_and_sequences_per_source() {
    let mut store = store(20, 5);
    let first = store.add_text(&lorem(30), "a.txt").unwrap();
    let second = store.add_text("short note", "b.txt").unwrap();

    assert_eq!(first.first(), Some(&0));
    assert_eq!(second, vec![first.len() as ChunkId]);
    for (pos, chunk) in store.iter().enumerate() {
        assert_eq!(chunk.id, pos as ChunkId);
    }
    let seqs: Vec<_> = store.iter().filter(|c| c.source == "a.txt").map(|c| c.sequence).collect();
    assert_eq!(seqs, (0..first.len() as u32).collect::<Vec<_>>());
    assert_eq!(store.get(second[0]).unwrap().sequence, 0);
    assert!(store.get(999).is_none());
}

#[test]
fn windows_cover_the_source_with_bounded_overlap() {
    for (size, overlap) in [(50, 10), (64, 0), (33, 32), (120, 40)] {
        let text = lorem(400);
        let mut store = store(size, overlap);
        store.add_text(&text, "doc").unwrap();

        let chars: Vec<char> = text.chars().collect();
        let mut covered = 0;
        for chunk in store.iter() {
            let len = chunk.text.chars().count();
            assert!(len <= size, "chunk longer than {size}");
            assert!(chunk.offset <= covered, "gap before offset {}", chunk.offset);
            assert!(covered - chunk.offset <= overlap, "overlap above {overlap}");
            let expected: String = chars[chunk.offset..chunk.offset + len].iter().collect();
            assert_eq!(chunk.text, expected);
            covered = chunk.offset + len;
        }
        assert_eq!(covered, chars.len());

        // Dropping the overlapping prefix of each chunk rebuilds the source.
        let mut rebuilt = String::new();
        let mut end = 0;
        for chunk in store.iter() {
            rebuilt.extend(chunk.text.chars().skip(end - chunk.offset));
            end = chunk.offset + chunk.text.chars().count();
        }
        assert_eq!(rebuilt, text);
    }
}

#[test]
fn add_chunks_keeps_fragments_verbatim() {
    let mut store = store(10, 2);
    let ids = store.add_chunks(["  padded  ", "a much longer fragment than the size"], "pre");
    assert_eq!(ids, vec![0, 1]);
    assert_eq!(store.get(0).unwrap().text, "  padded  ");
    assert_eq!(store.get(1).unwrap().offset, 10);
}

#[test]
fn offsets_continue_across_calls_for_one_source() {
    let mut store = store(1000, 100);
    store.add_chunks(["ab", "cd"], "pre");
    store.add_chunks(["ef"], "pre");
    store.add_text("ghij", "pre").unwrap();
    store.add_chunks(["xy"], "other");

    let placed: Vec<_> = store.iter().map(|c| (c.source.as_str(), c.sequence, c.offset)).collect();
    assert_eq!(
        placed,
        vec![("pre", 0, 0), ("pre", 1, 2), ("pre", 2, 4), ("pre", 3, 6), ("other", 0, 0)]
    );

    let mut restored = ChunkStore::from_chunks(store.into_chunks());
    restored.add_chunks(["kl"], "pre");
    let last = restored.iter().last().unwrap();
    assert_eq!((last.sequence, last.offset), (4, 10));
}

#[test]
fn stats_and_totals() {
    let mut store = store(1000, 100);
    assert_eq!(store.stats(), ChunkStats::default());

    store.add_text("alpha", "one").unwrap();
    store.add_text("beta gamma", "two").unwrap();
    assert_eq!(store.total_bytes(), 15);

    let stats = store.stats();
    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.sources, 2);
    assert!((stats.avg_chunk_bytes - 7.5).abs() < 1e-9);
}

#[test]
fn from_chunks_continues_sequences() {
    let mut original = store(1000, 0);
    original.add_text("first", "doc").unwrap();
    let restored = ChunkStore::from_chunks(original.clone().into_chunks());
    assert_eq!(restored.len(), 1);
    assert_eq!(restored.as_slice(), original.as_slice());
    assert_eq!(restored.stats().sources, 1);
}
