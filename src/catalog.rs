//! Static topic catalog: per-subject topics with prompt guidance, study links and targets.
//!
//! Lookups are keyed by (subject, topic) because some topic keys
//! (e.g. `molecular_biology`) exist under both subjects.

use crate::domain::{Difficulty, StudyResource, Subject};

pub struct TopicDef {
  pub key: &'static str,
  pub target: usize,
  pub guidance: &'static str,
  pub focus: &'static str,
  pub resources: &'static [(&'static str, &'static str, &'static str)],
}

const BIOLOGY_TOPICS: &[TopicDef] = &[
  TopicDef {
    key: "cell_biology",
    target: 200,
    guidance: "Cover cell structure, organelle function, membrane transport, cell cycle, apoptosis, cellular communication, and cytoskeleton. Integrate with molecular mechanisms.",
    focus: "- Membrane structure and function, organelle biology, cell cycle, signal transduction\n- Experimental techniques like microscopy, cell fractionation, protein localization",
    resources: &[
      ("Khan Academy: Cell Biology", "https://www.khanacademy.org/science/biology/structure-of-a-cell", "video"),
      ("BioInteractive: Cell Biology Resources", "https://www.biointeractive.org/classroom-resources?f%5B0%5D=topics%3A435", "interactive"),
    ],
  },
  TopicDef {
    key: "molecular_biology",
    target: 180,
    guidance: "Focus on DNA replication, transcription, translation, gene regulation, RNA processing, protein folding, and molecular techniques. Emphasize experimental methods.",
    focus: "- DNA replication, transcription, translation, gene regulation\n- Molecular techniques like PCR, cloning, sequencing, Western blots",
    resources: &[
      ("Khan Academy: Molecular Biology", "https://www.khanacademy.org/science/biology/gene-expression-and-regulation", "video"),
      ("HHMI BioInteractive: Central Dogma", "https://www.biointeractive.org/classroom-resources/central-dogma-and-genetic-medicine", "interactive"),
    ],
  },
  TopicDef {
    key: "biochemistry_integration",
    target: 170,
    guidance: "Connect metabolic pathways with cellular processes. Cover enzyme regulation, signaling cascades, protein interactions, and bioenergetics.",
    focus: "- Metabolic pathways, enzyme regulation, protein-protein interactions\n- Integration of biochemical processes with cellular functions",
    resources: &[
      ("Khan Academy: Metabolism Integration", "https://www.khanacademy.org/science/biology/cellular-respiration-and-fermentation", "video"),
      ("PDB-101: Metabolic Pathways", "https://pdb101.rcsb.org/learn/flyers-posters-and-videos/video/atp-synthase-in-action", "interactive"),
    ],
  },
  TopicDef {
    key: "organ_systems",
    target: 250,
    guidance: "Integrate anatomy with physiology. Cover cardiovascular, respiratory, digestive, nervous, endocrine, immune, and reproductive systems. Emphasize homeostasis.",
    focus: "- Physiological processes, homeostasis, system integration\n- Human anatomy and physiology with emphasis on exam-relevant systems",
    resources: &[
      ("Khan Academy: Human Biology", "https://www.khanacademy.org/science/high-school-biology/hs-human-body-systems", "video"),
      ("BioInteractive: Human Biology", "https://www.biointeractive.org/classroom-resources?f%5B0%5D=topics%3A433", "interactive"),
    ],
  },
  TopicDef {
    key: "genetics",
    target: 120,
    guidance: "Cover inheritance patterns, population genetics, genetic variation, mutation effects, gene mapping, and genetic technologies. Include evolutionary genetics.",
    focus: "- Inheritance patterns, population genetics, molecular genetics\n- Genetic analysis, linkage, and experimental design",
    resources: &[
      ("Khan Academy: Genetics", "https://www.khanacademy.org/science/biology/classical-genetics", "video"),
      ("BioInteractive: Genetics Resources", "https://www.biointeractive.org/classroom-resources?f%5B0%5D=topics%3A436", "interactive"),
    ],
  },
  TopicDef {
    key: "evolution",
    target: 80,
    guidance: "Cover natural selection, speciation, phylogeny, evolutionary evidence, population dynamics, and evolutionary developmental biology.",
    focus: "- Natural selection, speciation, phylogenetics, comparative biology\n- Evidence for evolution and evolutionary mechanisms",
    resources: &[
      ("Khan Academy: Evolution", "https://www.khanacademy.org/science/biology/evolution-and-natural-selection", "video"),
      ("BioInteractive: Evolution Resources", "https://www.biointeractive.org/classroom-resources?f%5B0%5D=topics%3A432", "interactive"),
    ],
  },
];

const BIOCHEMISTRY_TOPICS: &[TopicDef] = &[
  TopicDef {
    key: "amino_acids",
    target: 175,
    guidance: "Cover amino acid structure, side-chain chemistry, pKa and isoelectric point, titration curves, and peptide bond formation.",
    focus: "- Side-chain properties, charge at physiological pH, titration\n- Peptide bonds and their role in higher-order structure",
    resources: &[
      ("Khan Academy: Amino Acids", "https://www.khanacademy.org/science/organic-chemistry/amino-acids-and-proteins", "video"),
      ("PDB-101: Amino Acid Explorer", "https://pdb101.rcsb.org/learn/guide-to-understanding-pdb-data/dealing-with-coordinates", "interactive"),
    ],
  },
  TopicDef {
    key: "metabolism",
    target: 150,
    guidance: "Cover glycolysis, the citric acid cycle, oxidative phosphorylation, gluconeogenesis, glycogen and fatty acid metabolism, and hormonal regulation.",
    focus: "- Pathway regulation points and energetics\n- Fed versus fasted state integration",
    resources: &[
      ("Khan Academy: Cellular Respiration", "https://www.khanacademy.org/science/biology/cellular-respiration-and-fermentation", "video"),
    ],
  },
  TopicDef {
    key: "enzyme_kinetics",
    target: 150,
    guidance: "Cover Michaelis-Menten kinetics, Lineweaver-Burk analysis, inhibition types, allosteric regulation, and cooperativity. Include quantitative data interpretation.",
    focus: "- Km, Vmax and how inhibitors change them\n- Reading kinetic plots from experimental data",
    resources: &[
      ("Khan Academy: Enzyme Kinetics", "https://www.khanacademy.org/science/biology/energy-and-enzymes/enzyme-introduction/a/introduction-to-enzymes-and-catalysis", "video"),
      ("PDB-101: Enzyme Structure", "https://pdb101.rcsb.org/browse/enzymes", "interactive"),
    ],
  },
  TopicDef {
    key: "protein_structure",
    target: 100,
    guidance: "Cover primary through quaternary structure, folding forces, denaturation, chaperones, and structure-function relationships.",
    focus: "- Stabilising interactions at each structural level\n- Techniques such as circular dichroism and X-ray crystallography",
    resources: &[
      ("Khan Academy: Protein Structure", "https://www.khanacademy.org/science/biology/macromolecules/proteins-and-amino-acids", "video"),
      ("PDB-101: Protein Structure Tutorial", "https://pdb101.rcsb.org/learn/guide-to-understanding-pdb-data/introduction", "interactive"),
    ],
  },
  TopicDef {
    key: "biochemical_pathways",
    target: 75,
    guidance: "Cover pathway integration, signal transduction cascades, second messengers, and the regulation of flux between competing pathways.",
    focus: "- Crosstalk between catabolic and anabolic pathways\n- Kinase cascades and second messengers",
    resources: &[],
  },
  TopicDef {
    key: "molecular_biology",
    target: 50,
    guidance: "Cover the biochemistry of nucleic acids, replication and transcription enzymes, and laboratory techniques such as PCR and blotting.",
    focus: "- Nucleic acid chemistry and enzymology\n- Laboratory techniques and their biochemical basis",
    resources: &[],
  },
];

const GENERIC_GUIDANCE: &str = "Cover the core principles of the topic with emphasis on experimental reasoning and data interpretation.";
const GENERIC_FOCUS: &str = "- General principles and experimental analysis";

pub fn topics(subject: Subject) -> &'static [TopicDef] {
  match subject {
    Subject::Biology => BIOLOGY_TOPICS,
    Subject::Biochemistry => BIOCHEMISTRY_TOPICS,
  }
}

pub fn find_topic(subject: Subject, topic: &str) -> Option<&'static TopicDef> {
  topics(subject).iter().find(|t| t.key == topic)
}

/// Topic guidance paragraph, or a generic one for topics outside the catalog.
pub fn topic_guidance(subject: Subject, topic: &str) -> &'static str {
  find_topic(subject, topic).map(|t| t.guidance).unwrap_or(GENERIC_GUIDANCE)
}

pub fn topic_focus(subject: Subject, topic: &str) -> &'static str {
  find_topic(subject, topic).map(|t| t.focus).unwrap_or(GENERIC_FOCUS)
}

/// Study links injected into the prompt. Falls back to a subject-wide link when
/// the topic is unknown or has no curated links.
pub fn study_resources(subject: Subject, topic: &str) -> Vec<StudyResource> {
  let curated = find_topic(subject, topic).map(|t| t.resources).unwrap_or(&[]);
  if curated.is_empty() {
    let (title, url) = match subject {
      Subject::Biology => ("Khan Academy MCAT Biology", "https://www.khanacademy.org/test-prep/mcat/biological-sciences-practice"),
      Subject::Biochemistry => ("Khan Academy MCAT", "https://www.khanacademy.org/test-prep/mcat"),
    };
    return vec![StudyResource { title: title.into(), url: url.into(), kind: "video".into() }];
  }
  curated
    .iter()
    .map(|(title, url, kind)| StudyResource { title: (*title).into(), url: (*url).into(), kind: (*kind).into() })
    .collect()
}

pub fn difficulty_guidelines(difficulty: Difficulty) -> &'static str {
  match difficulty {
    Difficulty::Foundation => "Focus on fundamental principles. Test basic understanding of core concepts. Questions should be accessible but not trivial.",
    Difficulty::Intermediate => "Integrate 2-3 concepts. Require application of principles to new scenarios. Include some data interpretation.",
    Difficulty::Advanced => "Synthesize multiple systems and processes. Require analysis of complex experimental data. Test ability to predict outcomes.",
    Difficulty::Elite => "Demand highest-level critical thinking. Integrate biochemistry, genetics, and physiology. Analyze novel experimental designs and unexpected results.",
  }
}

/// Share of passage-based questions, in percent.
pub fn passage_percent(subject: Subject) -> u32 {
  match subject {
    Subject::Biology => 60,
    Subject::Biochemistry => 70,
  }
}
